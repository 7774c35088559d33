pub mod api {
    pub mod collaborators;
    pub mod comments;
    pub mod documents;
    pub mod errors;
    pub mod lifecycle;
    pub mod registrations;
    pub mod versions;
}
#[cfg(feature = "server")]
pub mod app;
pub mod auth {
    pub mod access;
    pub mod middleware;
    pub mod models;
}
pub mod config;
pub mod db {
    pub mod collaborator_repository;
    pub mod comment_repository;
    pub mod memory;
    #[cfg(feature = "server")]
    pub mod mongo;
    pub mod registration_repository;
    pub mod repository;
    pub mod version_repository;
}
pub mod error;
pub mod models {
    pub mod collaborator;
    pub mod comment;
    pub mod document;
    pub mod registration;
    pub mod timestamp;
    pub mod version;
}
