use maud::{html, Markup, Render};

pub struct Heading {
    pub text: String,
    pub level: HeadingLevel,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HeadingLevel {
    H1,
    H2,
}

impl Heading {
    pub fn h1(text: &str) -> Self {
        Self {
            text: text.to_string(),
            level: HeadingLevel::H1,
            color: None,
        }
    }

    pub fn h2(text: &str) -> Self {
        Self {
            level: HeadingLevel::H2,
            ..Self::h1(text)
        }
    }

    pub fn with_color(mut self, color: &str) -> Self {
        self.color = Some(color.to_string());
        self
    }
}

impl Render for Heading {
    fn render(&self) -> Markup {
        let color_class = self.color.as_deref().unwrap_or("text-gray-800");

        match self.level {
            HeadingLevel::H1 => {
                html! { h1 class={"text-2xl sm:text-3xl font-bold mb-3 " (color_class)} { (self.text) } }
            }
            HeadingLevel::H2 => {
                html! { h2 class={"text-lg sm:text-xl font-semibold mb-2 " (color_class)} { (self.text) } }
            }
        }
    }
}
