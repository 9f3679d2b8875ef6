mod cost;
mod operator;

pub use cost::WeightedQuadraticCost;
pub use operator::Convolution;
