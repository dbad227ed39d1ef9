use maud::{html, Markup, Render};

/// Developer diagnostics, rendered only when `DEVELOPMENT_MODE=1`.
///
/// Callers decide what goes in; nothing here should ever be a token or verifier.
#[derive(Default)]
pub struct DebugPanel {
    entries: Vec<(String, String)>,
}

impl DebugPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(mut self, label: &str, value: impl Into<String>) -> Self {
        self.entries.push((label.to_string(), value.into()));
        self
    }
}

impl Render for DebugPanel {
    fn render(&self) -> Markup {
        html! {
            details class="mt-6 text-left text-xs bg-gray-900 text-gray-100 rounded-lg p-4" {
                summary class="cursor-pointer font-mono text-yellow-300" { "Developer details" }
                dl class="mt-3 space-y-2 font-mono" {
                    @for (label, value) in &self.entries {
                        dt class="text-gray-400" { (label) }
                        dd class="whitespace-pre-wrap break-words" { (value) }
                    }
                }
            }
        }
    }
}
