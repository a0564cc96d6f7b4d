/// Image naming convention used by the CDN bucket
///
/// Derivative images are recognised purely by substrings of their object
/// names:
/// - Retina: `@2x` inserted before the extension (`foo@2x.jpg`)
/// - Mobile: `@2x` replaced by `_mobile@2x` (`foo_mobile@2x.jpg`)
/// - Webp: extension replaced by `.webp` (`foo@2x.webp`)
///
/// Every module that needs to tell the variants apart goes through here.
use std::sync::LazyLock;

use regex::Regex;

/// Marker inserted before the extension of retina images
pub const RETINA_MARKER: &str = "@2x";

/// Marker placed in front of the retina marker for mobile images
pub const MOBILE_MARKER: &str = "_mobile";

/// Subdirectory retina images are sorted into
pub const RETINA_SUBDIRECTORY: &str = "_retina";

/// Substrings left behind by earlier buggy transformation runs
const UNWANTED_SUBSTRINGS: [&str; 8] = [
    "@2x@2x",
    "_o",
    "psd",
    "?",
    "_mobile_mobile",
    "@2x-",
    "-1-1",
    "-1-2",
];

/// Retina copies generated repeatedly get a `-N-N` counter
static REPEATED_RETINA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"-[0-9]-[0-9]@2x\.jpg").expect("REPEATED_RETINA pattern is valid")
});

/// Variant of an image, derived from its object name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageVariant {
    /// Base image matching no derivative convention
    #[default]
    Standard,
    /// 2x derivative (`@2x`)
    Retina,
    /// Downscaled derivative for narrow viewports (`_mobile@2x`)
    Mobile,
    /// Webp copy (`.webp`)
    Webp,
}

impl ImageVariant {
    /// Classify an object name
    ///
    /// Precedence: webp extension, then `_mobile`, then `@2x`.
    pub fn classify(name: &str) -> Self {
        let (_, extension) = split_extension(name);
        if extension.is_some_and(|ext| ext.eq_ignore_ascii_case("webp")) {
            ImageVariant::Webp
        } else if name.contains(MOBILE_MARKER) {
            ImageVariant::Mobile
        } else if name.contains(RETINA_MARKER) {
            ImageVariant::Retina
        } else {
            ImageVariant::Standard
        }
    }
}

/// Split a name into (stem, extension), looking only at the last path segment
fn split_extension(name: &str) -> (&str, Option<&str>) {
    let file_start = name.rfind('/').map(|i| i + 1).unwrap_or(0);
    match name[file_start..].rfind('.') {
        Some(dot) if dot > 0 => {
            let dot = file_start + dot;
            (&name[..dot], Some(&name[dot + 1..]))
        }
        _ => (name, None),
    }
}

/// Name of the retina counterpart of `name`
///
/// Names that already carry the retina marker are returned unchanged.
pub fn retina_name(name: &str) -> String {
    if name.contains(RETINA_MARKER) {
        return name.to_string();
    }
    match split_extension(name) {
        (stem, Some(ext)) => format!("{stem}{RETINA_MARKER}.{ext}"),
        (stem, None) => format!("{stem}{RETINA_MARKER}"),
    }
}

/// Name of the mobile counterpart of `name` (base or retina)
pub fn mobile_name(name: &str) -> String {
    let retina = retina_name(name);
    if retina.contains(MOBILE_MARKER) {
        return retina;
    }
    retina.replacen(RETINA_MARKER, &format!("{MOBILE_MARKER}{RETINA_MARKER}"), 1)
}

/// Name of the webp counterpart of `name`
pub fn webp_name(name: &str) -> String {
    let (stem, _) = split_extension(name);
    format!("{stem}.webp")
}

/// Whether the object name is junk that should be purged
pub fn is_unwanted(name: &str) -> bool {
    UNWANTED_SUBSTRINGS.iter().any(|s| name.contains(s)) || REPEATED_RETINA.is_match(name)
}

/// Keys ending in `/` are folder placeholders, not images
pub fn is_directory_marker(name: &str) -> bool {
    name.ends_with('/')
}

/// Split a name into (folder, file) at the last `/`
fn split_folder(name: &str) -> (&str, &str) {
    match name.rfind('/') {
        Some(i) => (&name[..i], &name[i + 1..]),
        None => ("", name),
    }
}

fn is_retina_directory(folder: &str) -> bool {
    folder.rsplit('/').next() == Some(RETINA_SUBDIRECTORY)
}

fn join(folder: &str, file: &str) -> String {
    if folder.is_empty() {
        file.to_string()
    } else {
        format!("{folder}/{file}")
    }
}

/// Destination of a retina image inside the `_retina/` subdirectory of its folder
///
/// Returns `None` when the image already lives there.
pub fn retina_directory_name(name: &str) -> Option<String> {
    let (folder, file) = split_folder(name);
    if is_retina_directory(folder) {
        return None;
    }
    Some(join(&join(folder, RETINA_SUBDIRECTORY), file))
}

/// `name` as it would sit directly in its folder, outside `_retina/`
pub fn canonical_name(name: &str) -> String {
    let (folder, file) = split_folder(name);
    if !is_retina_directory(folder) {
        return name.to_string();
    }
    let parent = folder.rfind('/').map(|i| &folder[..i]).unwrap_or("");
    join(parent, file)
}

/// Every key a derivative named `name` may occupy
///
/// The folder itself comes first, then its `_retina/` subdirectory.
pub fn derivative_slots(name: &str) -> [String; 2] {
    let canonical = canonical_name(name);
    let sorted = retina_directory_name(&canonical).unwrap_or_else(|| canonical.clone());
    [canonical, sorted]
}
