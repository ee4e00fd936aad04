use super::IsoVariogramModel;

#[derive(Debug, Clone, Default, Copy)]
pub struct IsoGaussian {
    pub range: f64,
    pub sill: f64,
}

impl IsoGaussian {
    pub fn new(range: f64, sill: f64) -> Self {
        Self { range, sill }
    }
}

impl IsoVariogramModel for IsoGaussian {
    fn variogram(&self, h: f64) -> f64 {
        self.sill * (1.0 - (-3f64 * h * h / (self.range * self.range)).exp())
    }
}
