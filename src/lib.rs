pub mod config;
pub mod error;
pub mod events;
pub mod integrity;
pub mod manifest;
pub mod model;
pub mod render;
pub mod source;
pub mod store;
pub mod tasks {
    pub mod preloader;
    pub mod scheduler;
}
#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
