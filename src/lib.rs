pub mod config;
pub mod error;
pub mod estimators;
pub mod geometry;
pub mod progress;
pub mod raster;
pub mod spatial_database;
pub mod systems;
pub mod variography;

pub mod prelude {

    pub mod re_exports {
        pub use nalgebra;
        pub use rstar;
    }

    pub use crate::config::KrigingConfig;
    pub use crate::error::{KrigingError, Result};
    pub use crate::estimators::{
        cross_validation::CrossValidation, KrigingEngine, KrigingResult,
    };
    pub use crate::progress::{IndicatifProgress, NoProgress, ProgressSink};
    pub use crate::raster::{GridRaster, GridSpec};
    pub use crate::spatial_database::{point_set::PointSet, InputGeometry, SamplePoint};
    pub use crate::systems::ok_system::{KrigingEstimate, KrigingSystem};
    pub use crate::variography::{
        experimental::{bin_pairs, BinningMode, ExperimentalVariogram, VariogramSurface},
        fitting::{FitBackend, VariogramFitter},
        model_variograms::{VariogramModel, VariogramParameters, VariogramType},
        pairs::{PairCatalog, PairPolicy},
    };
}
