pub mod debug_panel;
pub mod layout;
pub mod ui;
