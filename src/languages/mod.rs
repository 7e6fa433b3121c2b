use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// Language label attached to every analysed file. Drives system prompt
/// selection and the markdown code fence used in prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Python,
    Cpp,
    Java,
    Sql,
    Generic,
}

impl Language {
    pub const ALL: [Language; 4] = [Language::Python, Language::Cpp, Language::Java, Language::Sql];

    pub fn label(&self) -> &'static str {
        match self {
            Language::Python => "Python",
            Language::Cpp => "C++",
            Language::Java => "Java",
            Language::Sql => "SQL",
            Language::Generic => "Generic",
        }
    }

    pub fn file_extensions(&self) -> &[&'static str] {
        match self {
            Language::Python => &["py", "pyw"],
            Language::Cpp => &["cpp", "cc", "cxx", "hpp", "h"],
            Language::Java => &["java"],
            Language::Sql => &["sql"],
            Language::Generic => &[],
        }
    }

    /// Info string for a markdown code fence; empty for unknown languages.
    pub fn fence(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Cpp => "cpp",
            Language::Java => "java",
            Language::Sql => "sql",
            Language::Generic => "",
        }
    }

    /// Name of the optional prompt file holding this language's system prompt.
    pub fn prompt_file(&self) -> &'static str {
        match self {
            Language::Python => "python.txt",
            Language::Cpp => "cpp.txt",
            Language::Java => "java.txt",
            Language::Sql => "sql.txt",
            Language::Generic => "generic.txt",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    extension_map: HashMap<String, Language>,
}

impl LanguageRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            extension_map: HashMap::new(),
        };

        for language in Language::ALL {
            registry.register(language);
        }

        registry
    }

    pub fn register(&mut self, language: Language) {
        for ext in language.file_extensions() {
            self.extension_map.insert(ext.to_string(), language);
        }
    }

    pub fn get_by_extension(&self, ext: &str) -> Option<Language> {
        self.extension_map.get(&ext.to_ascii_lowercase()).copied()
    }

    pub fn get_for_file(&self, path: &Path) -> Option<Language> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.get_by_extension(ext))
    }

    /// Language for a file, falling back to [`Language::Generic`].
    pub fn detect(&self, path: &Path) -> Language {
        self.get_for_file(path).unwrap_or(Language::Generic)
    }

    pub fn is_supported(&self, path: &Path) -> bool {
        self.get_for_file(path).is_some()
    }

    pub fn supported_extensions(&self) -> Vec<&str> {
        let mut exts: Vec<&str> = self.extension_map.keys().map(|s| s.as_str()).collect();
        exts.sort_unstable();
        exts
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::new()
    }
}
