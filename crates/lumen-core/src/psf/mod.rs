pub mod zernike;
pub mod widefield;

pub use widefield::{WideFieldModel, WideFieldParams};
