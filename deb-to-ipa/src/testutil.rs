// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fixture builders shared by tests.

use {crate::compression::CompressionKind, std::io::Write};

/// Bytes of the `Foo` binary in the sample application.
pub const FOO_BINARY: [u8; 4] = [0xde, 0xad, 0xbe, 0xef];

/// An entry to place in a test tar archive.
pub enum TestEntry {
    Dir(&'static str),
    File(&'static str, Vec<u8>, u32),
    Symlink(&'static str, &'static str),
    HardLink(&'static str, &'static str),
    Fifo(&'static str),
}

// tar::Header::set_path() normalizes away the leading `./` that real .deb
// files carry. So write the name field directly.
fn set_raw_path(header: &mut tar::Header, path: &str) {
    let name = &mut header.as_old_mut().name;
    name[0..path.len()].copy_from_slice(path.as_bytes());
}

fn new_header(path: &str, entry_type: tar::EntryType, mode: u32, size: u64) -> tar::Header {
    let mut header = tar::Header::new_gnu();
    set_raw_path(&mut header, path);
    header.set_entry_type(entry_type);
    header.set_mode(mode);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(0);
    header.set_size(size);

    header
}

/// Build an uncompressed tar archive from entries, in order.
pub fn build_tar(entries: &[TestEntry]) -> Vec<u8> {
    let mut builder = tar::Builder::new(vec![]);

    for entry in entries {
        let (mut header, data) = match entry {
            TestEntry::Dir(path) => (
                new_header(path, tar::EntryType::Directory, 0o755, 0),
                vec![],
            ),
            TestEntry::File(path, data, mode) => (
                new_header(path, tar::EntryType::Regular, *mode, data.len() as _),
                data.clone(),
            ),
            TestEntry::Symlink(path, target) => {
                let mut header = new_header(path, tar::EntryType::Symlink, 0o777, 0);
                header.set_link_name(target).unwrap();
                (header, vec![])
            }
            TestEntry::HardLink(path, target) => {
                let mut header = new_header(path, tar::EntryType::Link, 0o644, 0);
                header.set_link_name(target).unwrap();
                (header, vec![])
            }
            TestEntry::Fifo(path) => (new_header(path, tar::EntryType::Fifo, 0o644, 0), vec![]),
        };

        header.set_cksum();
        builder.append(&header, data.as_slice()).unwrap();
    }

    builder.into_inner().unwrap()
}

/// Build an ar archive from `(name, data)` members.
pub fn build_ar(members: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut builder = ar::Builder::new(vec![]);

    for (name, data) in members {
        let mut header = ar::Header::new(name.as_bytes().to_vec(), data.len() as _);
        header.set_mode(0o644);
        header.set_uid(0);
        header.set_gid(0);
        builder.append(&header, data.as_slice()).unwrap();
    }

    builder.into_inner().unwrap()
}

/// Compress data with the given format.
pub fn compress(kind: &CompressionKind, data: &[u8]) -> Vec<u8> {
    match kind {
        CompressionKind::Gzip => {
            let mut encoder = libflate::gzip::Encoder::new(vec![]).unwrap();
            encoder.write_all(data).unwrap();
            encoder.finish().into_result().unwrap()
        }
        CompressionKind::Xz => {
            let mut encoder = xz2::write::XzEncoder::new(vec![], 6);
            encoder.write_all(data).unwrap();
            encoder.finish().unwrap()
        }
        CompressionKind::Bzip2 => {
            let mut encoder = bzip2::write::BzEncoder::new(vec![], bzip2::Compression::default());
            encoder.write_all(data).unwrap();
            encoder.finish().unwrap()
        }
        CompressionKind::Lzma => {
            let options = xz2::stream::LzmaOptions::new_preset(6).unwrap();
            let stream = xz2::stream::Stream::new_lzma_encoder(&options).unwrap();
            let mut encoder = xz2::write::XzEncoder::new_stream(vec![], stream);
            encoder.write_all(data).unwrap();
            encoder.finish().unwrap()
        }
        CompressionKind::Uncompressed | CompressionKind::Unknown(_) => data.to_vec(),
    }
}

/// Produce an XML `Info.plist`.
pub fn info_plist(display_name: &str, version: &str, identifier: &str) -> Vec<u8> {
    indoc::formatdoc! {r#"
            <?xml version="1.0" encoding="UTF-8"?>
            <!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
            <plist version="1.0">
            <dict>
                <key>CFBundleDisplayName</key>
                <string>{}</string>
                <key>CFBundleVersion</key>
                <string>{}</string>
                <key>CFBundleIdentifier</key>
                <string>{}</string>
            </dict>
            </plist>
        "#,
        display_name, version, identifier
    }
    .into_bytes()
}

/// Tar entries for a package installing `Applications/Foo.app`.
pub fn foo_app_entries() -> Vec<TestEntry> {
    vec![
        TestEntry::Dir("./"),
        TestEntry::Dir("./Applications/"),
        TestEntry::Dir("./Applications/Foo.app/"),
        TestEntry::File(
            "./Applications/Foo.app/Info.plist",
            info_plist("Foo", "1.0", "com.example.foo"),
            0o644,
        ),
        TestEntry::File("./Applications/Foo.app/Foo", FOO_BINARY.to_vec(), 0o755),
    ]
}

/// Build a `.deb` whose data member has the given name and tar content.
///
/// The member is compressed according to its name.
pub fn build_deb(data_member_name: &str, entries: &[TestEntry]) -> Vec<u8> {
    let tar = build_tar(entries);
    let data = compress(&CompressionKind::from_member_name(data_member_name), &tar);

    build_ar(&[
        ("debian-binary", b"2.0\n".to_vec()),
        ("control.tar.gz", compress(&CompressionKind::Gzip, &build_tar(&[]))),
        (data_member_name, data),
    ])
}
