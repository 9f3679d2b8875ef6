mod hyperbolic;

pub use hyperbolic::HyperbolicTotalVariation;
