use maud::{html, Markup, Render};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ButtonVariant {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ButtonSize {
    Medium,
    Large,
}

/// A link styled as a button. Every button on these pages navigates somewhere.
pub struct Button {
    pub text: String,
    pub href: String,
    pub variant: ButtonVariant,
    pub size: ButtonSize,
    pub full_width: bool,
}

impl Button {
    pub fn primary(text: &str, href: &str) -> Self {
        Self {
            text: text.to_string(),
            href: href.to_string(),
            variant: ButtonVariant::Primary,
            size: ButtonSize::Medium,
            full_width: false,
        }
    }

    pub fn secondary(text: &str, href: &str) -> Self {
        Self {
            variant: ButtonVariant::Secondary,
            ..Self::primary(text, href)
        }
    }

    pub fn size(mut self, size: ButtonSize) -> Self {
        self.size = size;
        self
    }

    pub fn full_width(mut self, full_width: bool) -> Self {
        self.full_width = full_width;
        self
    }

    fn variant_classes(&self) -> &'static str {
        match self.variant {
            ButtonVariant::Primary => "bg-teal-600 hover:bg-teal-700 active:bg-teal-800 text-white focus:ring-2 focus:ring-teal-500 focus:ring-offset-2",
            ButtonVariant::Secondary => "bg-white hover:bg-gray-50 text-teal-700 border border-teal-300 hover:border-teal-400 focus:ring-2 focus:ring-teal-500 focus:ring-offset-2",
        }
    }

    fn size_classes(&self) -> &'static str {
        match self.size {
            ButtonSize::Medium => "py-2 sm:py-2.5 px-3 sm:px-4 text-sm sm:text-base",
            ButtonSize::Large => "py-2.5 sm:py-3 px-4 sm:px-6 text-base sm:text-lg",
        }
    }
}

impl Render for Button {
    fn render(&self) -> Markup {
        let width_class = if self.full_width { "w-full" } else { "" };
        let classes = format!(
            "{} {} {} font-medium rounded-lg shadow-sm transition-colors flex items-center justify-center",
            self.variant_classes(),
            self.size_classes(),
            width_class,
        );

        html! {
            a href=(self.href) class=(classes) { (self.text) }
        }
    }
}
