//! TIFF output configuration types

use strum_macros::{Display, EnumIter, EnumString};

/// TIFF compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, Display, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum TiffCompression {
    /// No compression (fastest, largest file)
    #[default]
    None,
    /// LZW compression (slow, good compression)
    Lzw,
    /// Deflate compression - fast level (good speed/size balance)
    DeflateFast,
    /// Deflate compression - best compression (slower)
    DeflateBest,
    /// Deflate compression - balanced
    DeflateBalanced,
}

/// Configuration for writing the merged frame
#[derive(Debug, Clone, PartialEq)]
pub struct TiffConfig {
    pub compression: TiffCompression,
    /// Predictor value for compression (2 selects horizontal differencing).
    /// Predictors cost encoding time; `None` is fastest.
    pub predictor: Option<u16>,
}

impl Default for TiffConfig {
    fn default() -> Self {
        Self {
            compression: TiffCompression::None,
            predictor: None,
        }
    }
}

impl TiffConfig {
    pub fn builder() -> TiffConfigBuilder {
        TiffConfigBuilder::default()
    }
}

/// Builder for TiffConfig
#[derive(Default)]
pub struct TiffConfigBuilder {
    compression: Option<TiffCompression>,
    predictor: Option<Option<u16>>,
}

impl TiffConfigBuilder {
    pub fn compression(mut self, compression: TiffCompression) -> Self {
        self.compression = Some(compression);
        self
    }

    pub fn predictor(mut self, predictor: Option<u16>) -> Self {
        self.predictor = Some(predictor);
        self
    }

    pub fn build(self) -> TiffConfig {
        let default = TiffConfig::default();
        TiffConfig {
            compression: self.compression.unwrap_or(default.compression),
            predictor: self.predictor.unwrap_or(default.predictor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides_defaults() {
        let config = TiffConfig::builder()
            .compression(TiffCompression::DeflateBest)
            .predictor(Some(2))
            .build();

        assert_eq!(config.compression, TiffCompression::DeflateBest);
        assert_eq!(config.predictor, Some(2));
    }

    #[test]
    fn test_compression_parses_from_text() {
        assert_eq!("lzw".parse::<TiffCompression>().unwrap(), TiffCompression::Lzw);
        assert_eq!(TiffCompression::DeflateFast.to_string(), "DeflateFast");
        assert!("zip".parse::<TiffCompression>().is_err());
    }
}
