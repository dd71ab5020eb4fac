pub mod apps;
pub mod navigate;
pub mod route;

pub use apps::apps_command;
pub use navigate::navigate_command;
pub use route::match_command;
