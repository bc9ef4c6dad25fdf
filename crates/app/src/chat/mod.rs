pub mod input;
pub mod render;
pub mod view;

pub use input::ChatCommand;
pub use render::ChatRenderer;
pub use view::ChatView;
