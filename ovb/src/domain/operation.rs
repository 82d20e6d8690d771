//! The fixed set of transformations and their typed parameters.
//!
//! Parameters may be given positionally (`speed 2`) or as `key=value`
//! pairs (`speed factor=2`); keys are case-insensitive.

use media_types::{AcceptedKinds, MediaKind, OutputFormat};
use url::Url;

use crate::{Error, Result};

const SPEED_RANGE: (f64, f64) = (0.01, 100.0);
const FPS_RANGE: (u32, u32) = (1, 240);
const REPU_RANGE: (u32, u32) = (1, 300);

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Reverse,
    Speed { factor: f64 },
    Pitch { value: f64 },
    /// 1 is best, 100 is worst.
    Quality { level: u8 },
    Volume { factor: f64 },
    Fps { value: u32 },
    /// Loop the input until it is `seconds` long.
    Repu { seconds: u32 },
    Hue { value: f64 },
    ToVid,
    ToGif,
    /// Three random sections, each reversed, stitched together.
    Ytp,
    /// One repeated section followed by ten scrambled blips.
    Stutter,
    Download { url: Url },
}

impl Operation {
    /// Every command name, in help order.
    pub const COMMANDS: &'static [&'static str] = &[
        "reverse", "speed", "pitch", "quality", "volume", "fps", "repu", "hue", "tovid", "togif",
        "ytp", "stutter", "download",
    ];

    pub fn parse(command: &str, args: &[String]) -> Result<Self> {
        let command = command.trim().to_ascii_lowercase();
        let params = Params::new(args);

        let op = match command.as_str() {
            "reverse" => Self::Reverse,
            "speed" => {
                let factor: f64 = params.require(&["factor", "speed"], "factor")?;
                check_range("factor", factor, SPEED_RANGE.0, SPEED_RANGE.1)?;
                Self::Speed { factor }
            }
            "pitch" => {
                let value: f64 = params.require(&["pitch", "value"], "pitch value")?;
                if !(value > 0.0 && value.is_finite()) {
                    return Err(Error::validation("pitch value must be greater than 0"));
                }
                Self::Pitch { value }
            }
            "quality" => {
                let level: i64 = params.require(&["quality", "level"], "quality")?;
                Self::Quality {
                    level: level.clamp(1, 100) as u8,
                }
            }
            "volume" => {
                let factor: f64 = params.require(&["volume", "factor"], "volume factor")?;
                if !(factor >= 0.0 && factor.is_finite()) {
                    return Err(Error::validation("volume factor must not be negative"));
                }
                Self::Volume { factor }
            }
            "fps" => {
                let value: u32 = params.require(&["fps", "value"], "fps value")?;
                check_range("fps", value, FPS_RANGE.0, FPS_RANGE.1)?;
                Self::Fps { value }
            }
            "repu" => {
                let seconds: u32 = params.require(&["seconds", "t"], "seconds")?;
                check_range("seconds", seconds, REPU_RANGE.0, REPU_RANGE.1)?;
                Self::Repu { seconds }
            }
            "hue" => {
                let value: f64 = params.require(&["hue", "value"], "hue value")?;
                if !value.is_finite() {
                    return Err(Error::validation("hue value must be a finite number"));
                }
                Self::Hue { value }
            }
            "tovid" => Self::ToVid,
            "togif" => Self::ToGif,
            "ytp" => Self::Ytp,
            "stutter" => Self::Stutter,
            "download" => {
                let raw: String = params.require(&["url"], "url")?;
                Self::Download {
                    url: parse_download_url(&raw)?,
                }
            }
            _ => return Err(Error::UnknownCommand(command)),
        };
        Ok(op)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Reverse => "reverse",
            Self::Speed { .. } => "speed",
            Self::Pitch { .. } => "pitch",
            Self::Quality { .. } => "quality",
            Self::Volume { .. } => "volume",
            Self::Fps { .. } => "fps",
            Self::Repu { .. } => "repu",
            Self::Hue { .. } => "hue",
            Self::ToVid => "tovid",
            Self::ToGif => "togif",
            Self::Ytp => "ytp",
            Self::Stutter => "stutter",
            Self::Download { .. } => "download",
        }
    }

    /// Which input kinds the operation takes. `None` means it needs no attachment.
    pub fn accepted_kinds(&self) -> Option<AcceptedKinds> {
        match self {
            Self::Download { .. } => None,
            Self::Pitch { .. } | Self::Ytp | Self::Stutter => Some(AcceptedKinds::VIDEO),
            Self::ToVid => Some(AcceptedKinds::IMAGE),
            _ => Some(AcceptedKinds::ANY),
        }
    }

    /// Whether the engine must probe the input and build a filter graph.
    pub fn is_compound(&self) -> bool {
        matches!(self, Self::Ytp | Self::Stutter)
    }

    pub fn output_format(&self, input_kind: MediaKind) -> OutputFormat {
        match (self, input_kind) {
            (Self::ToGif, _) => OutputFormat::Gif,
            (Self::Hue { .. }, MediaKind::Image) => OutputFormat::Png,
            _ => OutputFormat::Mp4,
        }
    }
}

fn check_range<T: PartialOrd + std::fmt::Display>(name: &str, value: T, min: T, max: T) -> Result<()> {
    // Written so that NaN fails.
    if !(value >= min && value <= max) {
        return Err(Error::validation(format!(
            "{} must be between {} and {}, got {}",
            name, min, max, value
        )));
    }
    Ok(())
}

fn parse_download_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| Error::validation(format!("'{}' is not a valid URL: {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Error::validation(format!(
            "unsupported URL scheme '{}', expected http or https",
            other
        ))),
    }
}

/// Command arguments split into `key=value` pairs and positionals.
struct Params<'a> {
    named: Vec<(String, &'a str)>,
    positional: Vec<&'a str>,
}

impl<'a> Params<'a> {
    fn new(args: &'a [String]) -> Self {
        let mut named = Vec::new();
        let mut positional = Vec::new();
        for arg in args {
            // A bare URL's query string is not a key: the part before '=' has ':' and '/'.
            match arg.split_once('=') {
                Some((key, value)) if is_param_key(key) => {
                    named.push((key.to_ascii_lowercase(), value))
                }
                _ => positional.push(arg.as_str()),
            }
        }
        Self { named, positional }
    }

    fn lookup(&self, keys: &[&str]) -> Option<&'a str> {
        keys.iter()
            .find_map(|key| {
                self.named
                    .iter()
                    .find(|(name, _)| name == key)
                    .map(|(_, value)| *value)
            })
            .or_else(|| self.positional.first().copied())
    }

    fn require<T: std::str::FromStr>(&self, keys: &[&str], label: &str) -> Result<T> {
        let raw = self
            .lookup(keys)
            .ok_or_else(|| Error::validation(format!("missing {}", label)))?;
        let value = raw
            .trim()
            .parse::<T>()
            .map_err(|_| Error::validation(format!("'{}' is not a valid {}", raw, label)))?;
        Ok(value)
    }
}

fn is_param_key(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_positional_and_named_params() {
        assert_eq!(
            Operation::parse("speed", &args(&["2"])).unwrap(),
            Operation::Speed { factor: 2.0 }
        );
        assert_eq!(
            Operation::parse("SPEED", &args(&["Factor=0.5"])).unwrap(),
            Operation::Speed { factor: 0.5 }
        );
    }

    #[test]
    fn test_non_numeric_factor_rejected() {
        let err = Operation::parse("speed", &args(&["fast"])).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        let err = Operation::parse("speed", &[]).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_special_floats_rejected() {
        for bad in ["NaN", "inf", "-1", "0"] {
            assert!(
                Operation::parse("speed", &args(&[bad])).is_err(),
                "speed {bad} should fail"
            );
        }
        assert!(Operation::parse("volume", &args(&["NaN"])).is_err());
        assert!(Operation::parse("pitch", &args(&["0"])).is_err());
        assert!(Operation::parse("hue", &args(&["NaN"])).is_err());
    }

    #[test]
    fn test_quality_is_clamped() {
        assert_eq!(
            Operation::parse("quality", &args(&["500"])).unwrap(),
            Operation::Quality { level: 100 }
        );
        assert_eq!(
            Operation::parse("quality", &args(&["-3"])).unwrap(),
            Operation::Quality { level: 1 }
        );
    }

    #[test]
    fn test_ranges() {
        assert!(Operation::parse("fps", &args(&["0"])).is_err());
        assert!(Operation::parse("fps", &args(&["30"])).is_ok());
        assert!(Operation::parse("repu", &args(&["301"])).is_err());
        assert_eq!(
            Operation::parse("repu", &args(&["seconds=12"])).unwrap(),
            Operation::Repu { seconds: 12 }
        );
    }

    #[test]
    fn test_download_url() {
        let op = Operation::parse("download", &args(&["https://example.com/watch?v=abc"])).unwrap();
        assert!(matches!(op, Operation::Download { ref url } if url.host_str() == Some("example.com")));
        assert!(Operation::parse("download", &args(&["ftp://example.com/x"])).is_err());
        assert!(Operation::parse("download", &args(&["not a url"])).is_err());
    }

    #[test]
    fn test_unknown_command() {
        let err = Operation::parse("explode", &[]).unwrap_err();
        assert!(matches!(err, Error::UnknownCommand(ref c) if c == "explode"));
    }

    #[test]
    fn test_every_command_parses_with_sample_args() {
        let samples: &[(&str, &[&str])] = &[
            ("reverse", &[]),
            ("speed", &["2"]),
            ("pitch", &["1.5"]),
            ("quality", &["50"]),
            ("volume", &["0.5"]),
            ("fps", &["15"]),
            ("repu", &["10"]),
            ("hue", &["90"]),
            ("tovid", &[]),
            ("togif", &[]),
            ("ytp", &[]),
            ("stutter", &[]),
            ("download", &["https://example.com/v"]),
        ];
        assert_eq!(samples.len(), Operation::COMMANDS.len());
        for (command, params) in samples {
            let op = Operation::parse(command, &args(params)).unwrap();
            assert_eq!(op.name(), *command);
        }
    }

    #[test]
    fn test_kinds_and_output_format() {
        assert_eq!(Operation::ToVid.accepted_kinds(), Some(AcceptedKinds::IMAGE));
        assert_eq!(Operation::Ytp.accepted_kinds(), Some(AcceptedKinds::VIDEO));
        assert!(Operation::Reverse.accepted_kinds().unwrap().accepts(MediaKind::Image));
        assert_eq!(
            Operation::Hue { value: 10.0 }.output_format(MediaKind::Image),
            OutputFormat::Png
        );
        assert_eq!(
            Operation::Hue { value: 10.0 }.output_format(MediaKind::Video),
            OutputFormat::Mp4
        );
        assert_eq!(Operation::ToGif.output_format(MediaKind::Video), OutputFormat::Gif);
        assert!(Operation::Stutter.is_compound());
        assert!(!Operation::Reverse.is_compound());
    }
}
