pub mod experimental;
pub mod fitting;
pub mod model_variograms;
pub mod pairs;
