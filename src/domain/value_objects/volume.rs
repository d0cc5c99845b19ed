use serde::{Deserialize, Serialize};

/// Number of shares in a trade; always strictly positive
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Volume(i64);

impl Volume {
    pub fn new(value: i64) -> Result<Self, String> {
        if value > 0 {
            Ok(Volume(value))
        } else {
            Err("Volume must be a positive integer".to_string())
        }
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for Volume {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Volume::new(value)
    }
}

impl From<Volume> for i64 {
    fn from(volume: Volume) -> Self {
        volume.0
    }
}
