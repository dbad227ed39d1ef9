use maud::{html, Markup, Render, DOCTYPE};

pub struct Page {
    pub title: String,
    pub content: Box<dyn Render>,
}

impl Page {
    pub fn new(title: &str, content: impl Render + 'static) -> Self {
        Self {
            title: title.to_string(),
            content: Box::new(content),
        }
    }
}

impl Render for Page {
    fn render(&self) -> Markup {
        html! {
            (DOCTYPE)
            html lang="en" {
                head {
                    meta charset="utf-8";
                    title { (self.title) }
                    script src="https://unpkg.com/@tailwindcss/browser@4" {}
                    meta name="viewport" content="width=device-width, initial-scale=1.0";
                    meta name="referrer" content="no-referrer";
                }

                body class="min-h-screen bg-gray-50 py-6 md:py-12 px-0 sm:px-4" {
                    (self.content.render())

                    div class="mt-6 md:mt-8 text-center text-sm text-gray-500" {
                        p { "Study device linking" }
                    }
                }
            }
        }
    }
}

impl axum::response::IntoResponse for Page {
    fn into_response(self) -> axum::response::Response {
        self.render().into_response()
    }
}

pub struct Card {
    pub content: Box<dyn Render>,
    pub max_width: Option<String>,
}

impl Card {
    pub fn new(content: impl Render + 'static) -> Self {
        Self {
            content: Box::new(content),
            max_width: None,
        }
    }

    pub fn with_max_width(mut self, max_width: &str) -> Self {
        self.max_width = Some(max_width.to_string());
        self
    }
}

impl Render for Card {
    fn render(&self) -> Markup {
        let width_class = self.max_width.as_deref().unwrap_or("max-w-md");

        html! {
            div class={(width_class) " mx-auto bg-white rounded-lg sm:rounded-xl border border-gray-100 shadow-md overflow-hidden w-full"} {
                div class="px-6 sm:px-8 py-6 sm:py-8" {
                    (self.content.render())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_escapes_title_and_wraps_content() {
        let page = Page::new("<Link>", Card::new(html! { p { "inside" } }));
        let rendered = page.render().into_string();

        assert!(rendered.starts_with("<!DOCTYPE html>"));
        assert!(rendered.contains("<title>&lt;Link&gt;</title>"));
        assert!(rendered.contains("<p>inside</p>"));
        assert!(rendered.contains("max-w-md"));
    }
}
