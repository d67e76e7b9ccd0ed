pub mod app_state;
pub mod endpoints;
pub mod username;

pub use app_state::{
    default_data_dir, default_install_dir, AppState, LauncherSettings, VersionFilter,
};
pub use endpoints::Endpoints;
pub use username::{KeyValueStore, TextFileStore, SAVED_USERNAME_KEY};
