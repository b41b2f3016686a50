use std::path::Path;

/// Chunking family a language belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageFamily {
    /// HTML-like templates: elements, headings, scripts.
    Markup,
    /// JS/TS: declarations, imports, doc comments.
    Procedural,
    Markdown,
    /// Fixed line windows only.
    Generic,
}

#[derive(Debug)]
pub struct LanguageConfig {
    pub name: &'static str,
    pub family: LanguageFamily,
    pub extensions: &'static [&'static str],
}

static LANGUAGES: &[LanguageConfig] = &[
    LanguageConfig {
        name: "html",
        family: LanguageFamily::Markup,
        extensions: &["html", "htm", "xhtml"],
    },
    LanguageConfig {
        name: "vue",
        family: LanguageFamily::Markup,
        extensions: &["vue"],
    },
    LanguageConfig {
        name: "svelte",
        family: LanguageFamily::Markup,
        extensions: &["svelte"],
    },
    LanguageConfig {
        name: "javascript",
        family: LanguageFamily::Procedural,
        extensions: &["js", "jsx", "mjs", "cjs"],
    },
    LanguageConfig {
        name: "typescript",
        family: LanguageFamily::Procedural,
        extensions: &["ts", "tsx", "mts", "cts"],
    },
    LanguageConfig {
        name: "markdown",
        family: LanguageFamily::Markdown,
        extensions: &["md", "mdx", "markdown"],
    },
    LanguageConfig {
        name: "css",
        family: LanguageFamily::Generic,
        extensions: &["css", "scss", "sass", "less"],
    },
    LanguageConfig {
        name: "json",
        family: LanguageFamily::Generic,
        extensions: &["json"],
    },
    LanguageConfig {
        name: "yaml",
        family: LanguageFamily::Generic,
        extensions: &["yml", "yaml"],
    },
    LanguageConfig {
        name: "toml",
        family: LanguageFamily::Generic,
        extensions: &["toml"],
    },
    LanguageConfig {
        name: "python",
        family: LanguageFamily::Generic,
        extensions: &["py"],
    },
    LanguageConfig {
        name: "rust",
        family: LanguageFamily::Generic,
        extensions: &["rs"],
    },
    LanguageConfig {
        name: "go",
        family: LanguageFamily::Generic,
        extensions: &["go"],
    },
    LanguageConfig {
        name: "java",
        family: LanguageFamily::Generic,
        extensions: &["java"],
    },
    LanguageConfig {
        name: "ruby",
        family: LanguageFamily::Generic,
        extensions: &["rb"],
    },
    LanguageConfig {
        name: "php",
        family: LanguageFamily::Generic,
        extensions: &["php"],
    },
];

static PLAIN_TEXT: LanguageConfig = LanguageConfig {
    name: "text",
    family: LanguageFamily::Generic,
    extensions: &["txt"],
};

impl LanguageConfig {
    pub fn get_all() -> &'static [LanguageConfig] {
        LANGUAGES
    }

    pub fn get_by_extension(ext: &str) -> Option<&'static LanguageConfig> {
        let ext = ext.to_ascii_lowercase();
        LANGUAGES
            .iter()
            .chain(std::iter::once(&PLAIN_TEXT))
            .find(|c| c.extensions.contains(&ext.as_str()))
    }

    pub fn get_by_name(name: &str) -> Option<&'static LanguageConfig> {
        LANGUAGES
            .iter()
            .chain(std::iter::once(&PLAIN_TEXT))
            .find(|c| c.name == name)
    }

    /// Language of a file path; unknown extensions are plain text.
    pub fn detect(path: &str) -> &'static LanguageConfig {
        Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Self::get_by_extension)
            .unwrap_or(&PLAIN_TEXT)
    }
}
