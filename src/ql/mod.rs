pub mod frame_stack;
pub mod learn;
pub mod ml_model;
pub mod prelude;

#[cfg(test)]
pub(crate) mod test_doubles;
