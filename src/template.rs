use crate::{
    error::{Error, Result},
    file::SourceFile,
    store::Section,
    tags::{NO_TAGS, TagExtractor},
};
use memchr::memmem;
use std::borrow::Cow;
use std::fs;
use std::sync::Arc;
use tracing::debug;

/// Placeholder for the resolved instructions text.
pub const INSTRUCTIONS_PLACEHOLDER: &str = "{instructions}";
/// Placeholder for the file name.
pub const FILENAME_PLACEHOLDER: &str = "{filename}";
/// Placeholder for the file contents.
pub const FILE_PLACEHOLDER: &str = "{file}";
/// Placeholder for the tag block (tagged variant only).
pub const TAGS_PLACEHOLDER: &str = "{tags}";

const PLAIN_TEMPLATE: &str = "{instructions}\n/* READ: {filename} */\n{file}\n/* WRITE: {filename} */\n";
const PLAIN_INSTRUCTIONS: &str = "Update this file according to the instructions and code context.";

const TAGGED_TEMPLATE: &str = "{instructions}\n/* TAGS: {filename} */\n{tags}\n/* READ: {filename} */\n{file}\n/* WRITE: {filename} */\n";
const TAGGED_INSTRUCTIONS: &str = "Update this file according to the instructions and code context. \
Fix every FIXME, complete every TODO and delete the code marked REMOVE, \
using the tags above to keep names consistent. Reply with the complete file only.";

/// Which built-in template and instructions a deployment uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemplateVariant {
    /// Instructions, file name and file contents
    #[default]
    Plain,
    /// Like `Plain`, plus a `{tags}` block filled by a [`TagExtractor`]
    Tagged,
}

impl TemplateVariant {
    /// Built-in template text.
    #[must_use]
    pub const fn default_template(self) -> &'static str {
        match self {
            Self::Plain => PLAIN_TEMPLATE,
            Self::Tagged => TAGGED_TEMPLATE,
        }
    }

    /// Built-in instructions text.
    #[must_use]
    pub const fn default_instructions(self) -> &'static str {
        match self {
            Self::Plain => PLAIN_INSTRUCTIONS,
            Self::Tagged => TAGGED_INSTRUCTIONS,
        }
    }

    /// Parses a `variant` config value.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "plain" => Some(Self::Plain),
            "tagged" => Some(Self::Tagged),
            _ => None,
        }
    }

    /// Reads the `variant` key of a section, defaulting to `Plain`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unknown variant name.
    pub fn from_section(section: &Section) -> Result<Self> {
        match section.get_non_empty("variant") {
            None => Ok(Self::Plain),
            Some(name) => Self::from_name(name).ok_or_else(|| {
                Error::config(format!(
                    "unknown variant '{name}' in [{}] (expected 'plain' or 'tagged')",
                    section.name()
                ))
            }),
        }
    }
}

/// Replaces every non-overlapping occurrence of `placeholder`, left to right.
///
/// Matching is on raw bytes, so the haystack need not be UTF-8. Occurrences
/// are counted first and the result is allocated once at its final length.
/// An empty placeholder leaves the input unchanged.
///
/// # Errors
///
/// Returns [`Error::Allocation`] if the output buffer cannot be allocated.
pub fn substitute_all(haystack: &[u8], placeholder: &[u8], replacement: &[u8]) -> Result<Vec<u8>> {
    if placeholder.is_empty() {
        return copy_exact(haystack);
    }

    let finder = memmem::Finder::new(placeholder);
    let count = finder.find_iter(haystack).count();
    if count == 0 {
        return copy_exact(haystack);
    }

    let final_len = (haystack.len() - count * placeholder.len())
        .checked_add(
            count
                .checked_mul(replacement.len())
                .ok_or_else(|| Error::allocation("substitution length overflow"))?,
        )
        .ok_or_else(|| Error::allocation("substitution length overflow"))?;

    let mut out = Vec::new();
    out.try_reserve_exact(final_len)?;

    let mut last = 0;
    for start in finder.find_iter(haystack) {
        out.extend_from_slice(&haystack[last..start]);
        out.extend_from_slice(replacement);
        last = start + placeholder.len();
    }
    out.extend_from_slice(&haystack[last..]);

    debug_assert_eq!(out.len(), final_len);
    Ok(out)
}

fn copy_exact(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.try_reserve_exact(bytes.len())?;
    out.extend_from_slice(bytes);
    Ok(out)
}

/// Loads the template for a section.
///
/// A non-empty `template` key names a file whose whole contents are used
/// as-is; otherwise the variant's built-in template is returned.
///
/// # Errors
///
/// Returns an IO error if the configured template file cannot be read.
pub fn load_template(section: &Section, variant: TemplateVariant) -> Result<Cow<'static, [u8]>> {
    match section.get_non_empty("template") {
        Some(path) => {
            debug!("Using template file {}", path);
            let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
            Ok(Cow::Owned(bytes))
        }
        None => Ok(Cow::Borrowed(variant.default_template().as_bytes())),
    }
}

/// Builds prompts for one deployment variant.
#[derive(Clone)]
pub struct PromptBuilder {
    variant: TemplateVariant,
    tags: Arc<dyn TagExtractor>,
}

impl PromptBuilder {
    /// Creates a builder; `tags` is consulted only by the tagged variant.
    #[must_use]
    pub fn new(variant: TemplateVariant, tags: Arc<dyn TagExtractor>) -> Self {
        Self { variant, tags }
    }

    /// The variant in use.
    #[must_use]
    pub const fn variant(&self) -> TemplateVariant {
        self.variant
    }

    /// Builds the prompt for one source.
    ///
    /// Substitution runs `{instructions}`, `{filename}`, then `{file}`, each
    /// over the whole current text, so placeholder-like text inside the file
    /// contents is never expanded by the earlier passes. In the tagged variant
    /// the tag extractor runs only when `{tags}` is still present afterwards,
    /// and only for sources read from a path; standard input gets [`NO_TAGS`].
    ///
    /// # Errors
    ///
    /// Returns an IO error if a configured template cannot be read, or an
    /// allocation error if a substitution buffer cannot be allocated.
    pub fn build(&self, section: &Section, source: &SourceFile) -> Result<Vec<u8>> {
        let instructions = section
            .get_non_empty("instructions")
            .unwrap_or_else(|| self.variant.default_instructions());

        let template = load_template(section, self.variant)?;

        let prompt = substitute_all(&template, INSTRUCTIONS_PLACEHOLDER.as_bytes(), instructions.as_bytes())?;
        let prompt = substitute_all(&prompt, FILENAME_PLACEHOLDER.as_bytes(), source.name.as_bytes())?;
        let prompt = substitute_all(&prompt, FILE_PLACEHOLDER.as_bytes(), &source.contents)?;

        if self.variant != TemplateVariant::Tagged
            || memmem::find(&prompt, TAGS_PLACEHOLDER.as_bytes()).is_none()
        {
            return Ok(prompt);
        }

        let tags = source.path.as_deref().and_then(|path| self.tags.extract(path));
        debug!("Tags for {}: {}", source.name, if tags.is_some() { "found" } else { "none" });
        substitute_all(
            &prompt,
            TAGS_PLACEHOLDER.as_bytes(),
            tags.as_deref().unwrap_or(NO_TAGS.as_bytes()),
        )
    }
}

impl std::fmt::Debug for PromptBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptBuilder")
            .field("variant", &self.variant)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::STDIN_NAME;
    use assert_fs::prelude::*;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    struct CountingTags {
        seen: Mutex<Vec<PathBuf>>,
        output: Option<Vec<u8>>,
    }

    impl CountingTags {
        fn new(output: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                output: output.map(|o| o.as_bytes().to_vec()),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    impl TagExtractor for CountingTags {
        fn extract(&self, path: &Path) -> Option<Vec<u8>> {
            self.seen.lock().unwrap().push(path.to_path_buf());
            self.output.clone()
        }
    }

    fn section_with(pairs: &[(&str, &str)]) -> Section {
        let mut section = Section::new("test");
        for (k, v) in pairs {
            section.set(*k, *v);
        }
        section
    }

    fn template_file(temp: &assert_fs::TempDir, text: &str) -> String {
        let file = temp.child("prompt.tmpl");
        file.write_str(text).unwrap();
        file.path().to_string_lossy().into_owned()
    }

    /// A source that looks like it was read from `name` on disk.
    fn on_disk(name: &str, contents: &str) -> SourceFile {
        SourceFile {
            path: Some(PathBuf::from(name)),
            ..SourceFile::new(name, contents)
        }
    }

    fn build(builder: &PromptBuilder, section: &Section, source: &SourceFile) -> String {
        String::from_utf8(builder.build(section, source).unwrap()).unwrap()
    }

    fn sub(haystack: &str, placeholder: &str, replacement: &str) -> String {
        let out = substitute_all(haystack.as_bytes(), placeholder.as_bytes(), replacement.as_bytes());
        String::from_utf8(out.unwrap()).unwrap()
    }

    #[test]
    fn test_substitute_all_basic() {
        assert_eq!(sub("a{x}b{x}c", "{x}", "--"), "a--b--c");
        assert_eq!(sub("none here", "{x}", "--"), "none here");
        assert_eq!(sub("{x}", "{x}", ""), "");
    }

    #[test]
    fn test_substitute_all_empty_placeholder() {
        assert_eq!(sub("abc", "", "zzz"), "abc");
    }

    #[test]
    fn test_substitute_all_non_overlapping() {
        assert_eq!(sub("aaaa", "aa", "b"), "bb");
        assert_eq!(sub("aaa", "aa", "b"), "ba");
    }

    #[test]
    fn test_substitute_all_no_rescan_of_replacement() {
        assert_eq!(sub("{x}", "{x}", "{x}{x}"), "{x}{x}");
    }

    #[test]
    fn test_substitute_all_raw_bytes() {
        let out = substitute_all(b"\xe9{file}\xff", b"{file}", b"caf\xe9").unwrap();
        assert_eq!(out, b"\xe9caf\xe9\xff");
    }

    #[test]
    fn test_substitute_all_length_property() {
        let cases = [
            ("{file} and {file} and {file}", "{file}", "0123456789"),
            ("{file}{file}", "{file}", ""),
            ("héllo {n} wörld {n}", "{n}", "ñ"),
            ("no match", "{n}", "abc"),
        ];

        for (haystack, placeholder, replacement) in cases {
            let n = haystack.matches(placeholder).count();
            let out = sub(haystack, placeholder, replacement);

            assert_eq!(
                out.len(),
                haystack.len() + n * replacement.len() - n * placeholder.len()
            );
            if !replacement.contains(placeholder) {
                assert_eq!(out.matches(placeholder).count(), 0);
            }
            assert_eq!(out, haystack.replace(placeholder, replacement));
        }
    }

    #[test]
    fn test_variant_from_section() {
        assert_eq!(
            TemplateVariant::from_section(&section_with(&[])).unwrap(),
            TemplateVariant::Plain
        );
        assert_eq!(
            TemplateVariant::from_section(&section_with(&[("variant", "tagged")])).unwrap(),
            TemplateVariant::Tagged
        );
        let err = TemplateVariant::from_section(&section_with(&[("variant", "fancy")])).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_build_default_plain() {
        let builder = PromptBuilder::new(TemplateVariant::Plain, CountingTags::new(None));
        let prompt = build(&builder, &section_with(&[]), &on_disk("main.c", "int x;\n"));

        assert_eq!(
            prompt,
            "Update this file according to the instructions and code context.\n\
             /* READ: main.c */\nint x;\n\n/* WRITE: main.c */\n"
        );
    }

    #[test]
    fn test_build_keeps_latin1_contents() {
        let builder = PromptBuilder::new(TemplateVariant::Plain, CountingTags::new(None));
        let source = SourceFile {
            contents: b"/* caf\xe9 */\n".to_vec(),
            ..on_disk("legacy.c", "")
        };

        let prompt = builder.build(&section_with(&[("instructions", "I")]), &source).unwrap();

        assert_eq!(prompt, b"I\n/* READ: legacy.c */\n/* caf\xe9 */\n\n/* WRITE: legacy.c */\n");
    }

    #[test]
    fn test_build_instructions_override() {
        let builder = PromptBuilder::new(TemplateVariant::Plain, CountingTags::new(None));
        let prompt = build(
            &builder,
            &section_with(&[("instructions", "Add docs.")]),
            &on_disk("a.rs", "fn a() {}"),
        );

        assert!(prompt.starts_with("Add docs.\n"));
    }

    #[test]
    fn test_empty_instructions_fall_back() {
        let builder = PromptBuilder::new(TemplateVariant::Plain, CountingTags::new(None));
        let prompt = build(&builder, &section_with(&[("instructions", "")]), &on_disk("a.rs", ""));

        assert!(prompt.starts_with(PLAIN_INSTRUCTIONS));
    }

    #[test]
    fn test_file_contents_not_resubstituted() {
        let temp = assert_fs::TempDir::new().unwrap();
        let path = template_file(&temp, "{instructions}-{filename}-{file}");
        let section = section_with(&[("template", path.as_str()), ("instructions", "I")]);

        let builder = PromptBuilder::new(TemplateVariant::Plain, CountingTags::new(None));
        let prompt = build(&builder, &section, &on_disk("f.txt", "{filename}"));

        assert_eq!(prompt, "I-f.txt-{filename}");
    }

    #[test]
    fn test_missing_template_file_is_io_error() {
        let temp = assert_fs::TempDir::new().unwrap();
        let missing = temp.path().join("nope.tmpl");
        let section = section_with(&[("template", missing.to_str().unwrap())]);

        let builder = PromptBuilder::new(TemplateVariant::Plain, CountingTags::new(None));
        let err = builder.build(&section, &on_disk("a", "b")).unwrap_err();
        assert!(err.is_io());
    }

    #[test]
    fn test_tagged_without_tags_placeholder_never_extracts() {
        let temp = assert_fs::TempDir::new().unwrap();
        let path = template_file(&temp, "{instructions}\n{file}");
        let tags = CountingTags::new(Some("tag line"));

        let builder = PromptBuilder::new(TemplateVariant::Tagged, tags.clone());
        build(&builder, &section_with(&[("template", path.as_str())]), &on_disk("a.c", "x"));

        assert_eq!(tags.calls(), 0);
    }

    #[test]
    fn test_tags_placeholder_in_file_contents_triggers_extraction() {
        let temp = assert_fs::TempDir::new().unwrap();
        let path = template_file(&temp, "{instructions}\n{file}");
        let tags = CountingTags::new(Some("main function 1 a.c"));

        let builder = PromptBuilder::new(TemplateVariant::Tagged, tags.clone());
        let prompt = build(
            &builder,
            &section_with(&[("template", path.as_str()), ("instructions", "I")]),
            &on_disk("a.c", "see {tags}"),
        );

        assert_eq!(tags.calls(), 1);
        assert_eq!(prompt, "I\nsee main function 1 a.c");
    }

    #[test]
    fn test_tagged_default_inserts_tags() {
        let tags = CountingTags::new(Some("main function 1 a.c"));
        let builder = PromptBuilder::new(TemplateVariant::Tagged, tags.clone());

        let prompt = build(&builder, &section_with(&[]), &on_disk("a.c", "int main;"));

        assert_eq!(*tags.seen.lock().unwrap(), vec![PathBuf::from("a.c")]);
        assert!(prompt.contains("/* TAGS: a.c */\nmain function 1 a.c\n"));
        assert!(prompt.starts_with(TAGGED_INSTRUCTIONS));
        assert!(prompt.contains("FIXME"));
    }

    #[test]
    fn test_tagged_no_output_uses_sentinel() {
        let tags = CountingTags::new(None);
        let builder = PromptBuilder::new(TemplateVariant::Tagged, tags.clone());

        let prompt = build(&builder, &section_with(&[]), &on_disk("a.c", "x"));

        assert_eq!(tags.calls(), 1);
        assert!(prompt.contains("\nNO CTAGS\n"));
        assert!(!prompt.contains(TAGS_PLACEHOLDER));
    }

    #[test]
    fn test_tagged_stdin_skips_extraction() {
        let tags = CountingTags::new(Some("never used"));
        let builder = PromptBuilder::new(TemplateVariant::Tagged, tags.clone());

        let prompt = build(&builder, &section_with(&[]), &SourceFile::new(STDIN_NAME, "x"));

        assert_eq!(tags.calls(), 0);
        assert!(prompt.contains("/* TAGS: <stdin> */\nNO CTAGS\n"));
    }

    #[test]
    fn test_plain_variant_leaves_tags_placeholder() {
        let temp = assert_fs::TempDir::new().unwrap();
        let path = template_file(&temp, "{tags}|{file}");
        let tags = CountingTags::new(Some("t"));

        let builder = PromptBuilder::new(TemplateVariant::Plain, tags.clone());
        let prompt = build(&builder, &section_with(&[("template", path.as_str())]), &on_disk("a.c", "x"));

        assert_eq!(prompt, "{tags}|x");
        assert_eq!(tags.calls(), 0);
    }
}
