pub mod localization;
pub mod movie;
