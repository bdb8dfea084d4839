pub mod catch_environment;
pub mod preprocess;
