// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Convert jailbreak `.deb` packages to iOS `.ipa` archives.

A `.deb` is an `ar` archive. One of its members, `data.tar` (usually
compressed), holds the files the package installs. Packages shipping an iOS
application install it as `Applications/<Name>.app`. An `.ipa` is a zip file
containing that bundle under a top-level `Payload/` directory.

This crate performs the conversion entirely in pure Rust. No external `ar`,
`tar` or `zip` tools are invoked.

# A Tour of Functionality

[DebConverter] drives a conversion through the stages described by
[ConversionStage], reporting progress as [ConversionEvent] values. It owns a
[ScratchArea] holding intermediate state.

The stages are implemented by standalone modules:

* [container] reads the outer `ar` archive and finds the `data.tar` member.
* [compression] maps the member name to a codec and decompresses it.
* [materialize] extracts the tar stream onto the filesystem.
* [bundle] locates `.app` bundles and reads their `Info.plist`.
* [archiver] stages bundles into `Payload/` and writes the zip.

Every failure is expressed as a [ConversionError], which can render a
message suitable for end-users via [ConversionError::user_message].

# Example

```no_run
use deb_to_ipa::{DebConverter, ScratchArea};

let scratch = ScratchArea::temporary()?;
let mut converter = DebConverter::new(scratch, "/tmp/out");

let res = converter.convert(
    std::path::Path::new("/tmp/com.example.foo.deb"),
    Some(&|event| println!("{}", event)),
)?;
println!("wrote {} for {}", res.archive_path.display(), res.descriptor);

converter.cleanup()?;
# Ok::<(), deb_to_ipa::ConversionError>(())
```
*/

pub mod archiver;
pub mod bundle;
pub mod compression;
pub mod container;
pub mod error;
pub mod materialize;
pub mod pipeline;
pub mod scratch;
#[cfg(test)]
mod testutil;

pub use crate::{
    bundle::BundleDescriptor,
    error::{ConversionError, Result},
    pipeline::{
        CancellationToken, ConversionEvent, ConversionResult, ConversionStage, DebConverter,
    },
    scratch::ScratchArea,
};
