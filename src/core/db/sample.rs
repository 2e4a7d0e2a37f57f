use std::future::Future;

/// Ground-truth class of a stored training sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleLabel {
    NoCrack,
    Crack,
}

impl TryFrom<i64> for SampleLabel {
    type Error = anyhow::Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SampleLabel::NoCrack),
            1 => Ok(SampleLabel::Crack),
            _ => Err(anyhow::anyhow!("Invalid sample label value: {}", value)),
        }
    }
}

impl From<SampleLabel> for i64 {
    fn from(label: SampleLabel) -> Self {
        match label {
            SampleLabel::NoCrack => 0,
            SampleLabel::Crack => 1,
        }
    }
}

impl std::str::FromStr for SampleLabel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace(['-', ' '], "_").as_str() {
            "CRACK" => Ok(SampleLabel::Crack),
            "NO_CRACK" | "NOCRACK" => Ok(SampleLabel::NoCrack),
            _ => Err(anyhow::anyhow!("Unknown sample label: {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrainingSample {
    pub id: i64,
    /// Raw grayscale ROI pixels, row-major.
    pub pixels: Vec<u8>,
    pub label: SampleLabel,
    pub(super) _guard: (),
}

pub trait SampleRepository {
    fn add_sample(
        &self,
        pixels: &[u8],
        label: SampleLabel,
    ) -> impl Future<Output = anyhow::Result<i64>> + Send;
    fn sample_count(&self) -> impl Future<Output = anyhow::Result<u64>> + Send;
    fn first_sample(&self) -> impl Future<Output = anyhow::Result<Option<TrainingSample>>> + Send;
    fn get_samples(
        &self,
        label: Option<SampleLabel>,
    ) -> impl Future<Output = anyhow::Result<Vec<TrainingSample>>> + Send;
}
