// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Reading of the outer `ar` container of `.deb` files.

A .deb binary package file is an ar archive, typically with 3 members:

1. `debian-binary` holding the version of the binary package format.
2. `control.tar[.<ext>]` holding package metadata.
3. `data.tar[.<ext>]` holding file content.

Only the `data.tar` member matters for conversion.
*/

use {
    crate::error::{ConversionError, Result},
    log::{debug, warn},
    std::io::Read,
};

/// Name prefix of the member holding installed file content.
pub const DATA_MEMBER_PREFIX: &str = "data.tar";

/// A member of the outer ar archive.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ArchiveMember {
    name: String,
    payload: Vec<u8>,
}

impl ArchiveMember {
    /// Construct an instance from a name and its raw content.
    pub fn new(name: impl ToString, payload: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            payload,
        }
    }

    /// The member's file name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The member's raw content.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Whether this member holds the package's data archive.
    pub fn is_data_archive(&self) -> bool {
        self.name.starts_with(DATA_MEMBER_PREFIX)
    }
}

/// Streaming reader of ar archive members.
///
/// Members are yielded in file order. Once an error is emitted, the iterator
/// is exhausted.
pub struct ContainerReader<R: Read> {
    archive: ar::Archive<R>,
    failed: bool,
}

impl<R: Read> ContainerReader<R> {
    /// Construct a new instance from a reader.
    pub fn new(reader: R) -> Self {
        Self {
            archive: ar::Archive::new(reader),
            failed: false,
        }
    }

    fn read_member(entry: &mut ar::Entry<'_, R>) -> Result<ArchiveMember> {
        // Filenames should be ASCII. GNU ar terminates names with `/` and the
        // common format pads with spaces.
        let name = String::from_utf8_lossy(entry.header().identifier())
            .trim_end()
            .trim_end_matches('/')
            .to_string();
        let expected = entry.header().size();

        // The declared size is untrusted until the payload has been read.
        let mut payload = Vec::new();
        entry
            .read_to_end(&mut payload)
            .map_err(|e| ConversionError::MalformedContainer(format!("{}: {}", name, e)))?;

        if payload.len() as u64 != expected {
            return Err(ConversionError::MalformedContainer(format!(
                "member {} is truncated: expected {} bytes, got {}",
                name,
                expected,
                payload.len()
            )));
        }

        debug!("read ar member {} ({} bytes)", name, payload.len());

        Ok(ArchiveMember::new(name, payload))
    }
}

impl<R: Read> Iterator for ContainerReader<R> {
    type Item = Result<ArchiveMember>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        let res = match self.archive.next_entry()? {
            Ok(mut entry) => Self::read_member(&mut entry),
            Err(e) => Err(ConversionError::MalformedContainer(e.to_string())),
        };

        if res.is_err() {
            self.failed = true;
        }

        Some(res)
    }
}

/// Resolve the first `data.tar*` member of an ar archive.
///
/// Members after the first matching one are still parsed so a corrupt
/// trailing header is reported, but additional data members are ignored.
pub fn find_data_member(reader: impl Read) -> Result<ArchiveMember> {
    let mut found: Option<ArchiveMember> = None;

    for member in ContainerReader::new(reader) {
        let member = member?;

        if !member.is_data_archive() {
            continue;
        }

        if let Some(existing) = &found {
            warn!(
                "ignoring additional data member {}; already using {}",
                member.name(),
                existing.name()
            );
        } else {
            found = Some(member);
        }
    }

    found.ok_or(ConversionError::NoDataFound)
}

#[cfg(test)]
mod tests {
    use {super::*, crate::testutil::build_ar};

    #[test]
    fn members_in_file_order() -> Result<()> {
        let data = build_ar(&[
            ("debian-binary", b"2.0\n".to_vec()),
            ("control.tar.gz", vec![1, 2, 3]),
            ("data.tar.xz", vec![4, 5]),
        ]);

        let members =
            ContainerReader::new(std::io::Cursor::new(data)).collect::<Result<Vec<_>>>()?;

        assert_eq!(
            members.iter().map(|m| m.name()).collect::<Vec<_>>(),
            vec!["debian-binary", "control.tar.gz", "data.tar.xz"]
        );
        assert_eq!(members[0].payload(), b"2.0\n");
        assert_eq!(members[2].payload(), &[4, 5]);
        assert!(members[2].is_data_archive());
        assert!(!members[1].is_data_archive());

        Ok(())
    }

    #[test]
    fn bad_magic() {
        let mut reader =
            ContainerReader::new(std::io::Cursor::new(b"PK\x03\x04nonsense".to_vec()));

        assert!(matches!(
            reader.next(),
            Some(Err(ConversionError::MalformedContainer(_)))
        ));
        assert!(reader.next().is_none());
    }

    #[test]
    fn empty_input() {
        assert!(matches!(
            find_data_member(std::io::Cursor::new(vec![])),
            Err(ConversionError::MalformedContainer(_))
        ));
    }

    #[test]
    fn truncated_member() {
        let mut data = build_ar(&[("data.tar.gz", vec![42; 100])]);
        data.truncate(data.len() - 50);

        assert!(matches!(
            find_data_member(std::io::Cursor::new(data)),
            Err(ConversionError::MalformedContainer(_))
        ));
    }

    #[test]
    fn oversized_declared_size() {
        let mut data = b"!<arch>\n".to_vec();
        data.extend_from_slice(
            format!(
                "{:<16}{:<12}{:<6}{:<6}{:<8}{:<10}`\n",
                "data.tar.gz", 0, 0, 0, 644, 9_999_999_999u64
            )
            .as_bytes(),
        );
        data.extend_from_slice(&[1, 2, 3]);

        assert!(matches!(
            find_data_member(std::io::Cursor::new(data)),
            Err(ConversionError::MalformedContainer(_))
        ));
    }

    #[test]
    fn truncated_header() {
        let mut data = build_ar(&[("debian-binary", b"2.0\n".to_vec())]);
        data.extend_from_slice(b"data.tar.gz     1234");

        assert!(matches!(
            find_data_member(std::io::Cursor::new(data)),
            Err(ConversionError::MalformedContainer(_))
        ));
    }

    #[test]
    fn no_data_member() {
        let data = build_ar(&[
            ("debian-binary", b"2.0\n".to_vec()),
            ("control.tar.gz", vec![1]),
        ]);

        assert!(matches!(
            find_data_member(std::io::Cursor::new(data)),
            Err(ConversionError::NoDataFound)
        ));
    }

    #[test]
    fn first_data_member_wins() -> Result<()> {
        let data = build_ar(&[("data.tar.gz", vec![1]), ("data.tar.xz", vec![2])]);

        let member = find_data_member(std::io::Cursor::new(data))?;
        assert_eq!(member.name(), "data.tar.gz");
        assert_eq!(member.payload(), &[1]);

        Ok(())
    }
}
