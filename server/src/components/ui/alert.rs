use maud::{html, Markup, Render};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AlertKind {
    Success,
    Error,
    Info,
}

pub struct Alert {
    pub kind: AlertKind,
    pub message: String,
}

impl Alert {
    pub fn success(message: &str) -> Self {
        Self {
            kind: AlertKind::Success,
            message: message.to_string(),
        }
    }

    pub fn error(message: &str) -> Self {
        Self {
            kind: AlertKind::Error,
            message: message.to_string(),
        }
    }

    pub fn info(message: &str) -> Self {
        Self {
            kind: AlertKind::Info,
            message: message.to_string(),
        }
    }

    fn color_classes(&self) -> &'static str {
        match self.kind {
            AlertKind::Success => "bg-green-50 border-green-200 text-green-800",
            AlertKind::Error => "bg-red-50 border-red-200 text-red-800",
            AlertKind::Info => "bg-blue-50 border-blue-200 text-blue-800",
        }
    }
}

impl Render for Alert {
    fn render(&self) -> Markup {
        let role = match self.kind {
            AlertKind::Error => "alert",
            AlertKind::Success | AlertKind::Info => "status",
        };

        html! {
            div role=(role) class={"border rounded-lg px-4 py-3 text-sm sm:text-base " (self.color_classes())} {
                (self.message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_alert_is_announced() {
        let rendered = Alert::error("Nope <b>").render().into_string();
        assert!(rendered.contains(r#"role="alert""#));
        assert!(rendered.contains("Nope &lt;b&gt;"));
    }
}
