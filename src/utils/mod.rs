pub mod credentials;
pub mod path_validator;
pub mod toml;
pub mod xml;
