// Four-part file version as stored in a PE `VS_FIXEDFILEINFO` block.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, ErrorKind};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FileVersion {
    pub major: u16,
    pub minor: u16,
    pub build: u16,
    pub revision: u16,
}

impl FileVersion {
    pub const fn new(major: u16, minor: u16, build: u16, revision: u16) -> Self {
        Self {
            major,
            minor,
            build,
            revision,
        }
    }

    /// Splits the `dwFileVersionMS`/`dwFileVersionLS` pair into its four parts.
    pub const fn from_ms_ls(ms: u32, ls: u32) -> Self {
        Self::new(
            (ms >> 16) as u16,
            (ms & 0xFFFF) as u16,
            (ls >> 16) as u16,
            (ls & 0xFFFF) as u16,
        )
    }

    pub const fn to_ms_ls(self) -> (u32, u32) {
        (
            ((self.major as u32) << 16) | self.minor as u32,
            ((self.build as u32) << 16) | self.revision as u32,
        )
    }
}

impl fmt::Display for FileVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

impl FromStr for FileVersion {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            Error::new(ErrorKind::Usage)
                .with_message(format!("invalid file version {value:?}"))
                .with_hint("Versions have four numeric parts, e.g. 2.8.4.4.")
        };
        let mut parts = [0u16; 4];
        let mut count = 0;
        for part in value.trim().split('.') {
            if count == parts.len() {
                return Err(invalid());
            }
            parts[count] = part.parse::<u16>().map_err(|err| invalid().with_source(err))?;
            count += 1;
        }
        if count != parts.len() {
            return Err(invalid());
        }
        Ok(Self::new(parts[0], parts[1], parts[2], parts[3]))
    }
}

impl TryFrom<String> for FileVersion {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FileVersion> for String {
    fn from(value: FileVersion) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::FileVersion;
    use crate::core::error::ErrorKind;

    #[test]
    fn parses_four_parts() {
        let version: FileVersion = "2.8.4.4".parse().expect("parse");
        assert_eq!(version, FileVersion::new(2, 8, 4, 4));
        assert_eq!(version.to_string(), "2.8.4.4");
    }

    #[test]
    fn rejects_short_long_and_non_numeric() {
        for input in ["2.8.4", "2.8.4.4.1", "2.8.x.4", "", "70000.0.0.0"] {
            let err = input.parse::<FileVersion>().expect_err(input);
            assert_eq!(err.kind(), ErrorKind::Usage);
        }
    }

    #[test]
    fn ms_ls_split_matches_fixed_file_info_layout() {
        let version = FileVersion::from_ms_ls(0x0002_0008, 0x0004_0004);
        assert_eq!(version, FileVersion::new(2, 8, 4, 4));
        assert_eq!(version.to_ms_ls(), (0x0002_0008, 0x0004_0004));
    }

    #[test]
    fn equality_covers_every_part() {
        let required = FileVersion::new(1, 2, 3, 5);
        assert_ne!(FileVersion::new(1, 2, 3, 4), required);
        assert_ne!(FileVersion::new(2, 2, 3, 5), required);
        assert_eq!(FileVersion::new(1, 2, 3, 5), required);
    }

    #[test]
    fn serde_uses_dotted_string() {
        let version = FileVersion::new(6, 14, 11, 3000);
        let json = serde_json::to_string(&version).expect("encode");
        assert_eq!(json, "\"6.14.11.3000\"");
        let back: FileVersion = serde_json::from_str(&json).expect("decode");
        assert_eq!(back, version);
    }
}
