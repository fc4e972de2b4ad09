pub mod anchor;
pub mod import;
pub mod status;
pub mod template;
