//! Per-language container image and bootstrap command table.
//!
//! A skill body is written to `<workspace>/<file_name>` and its inputs to
//! `<workspace>/inputs.json`. The entrypoint command is responsible for
//! reading `inputs.json`, running the skill, and writing its result as the
//! final line of stdout as JSON. Anything printed before that line is
//! treated as incidental log output.

use wishub_core::Language;

/// Image and bootstrap command for one supported language.
pub struct LanguageEntrypoint {
    pub image: &'static str,
    pub file_name: &'static str,
    pub command: &'static [&'static str],
}

/// Resolve the image and bootstrap command for `language`.
///
/// Mirrors `RuntimeEngine.language_images` from the original service, pinned
/// to the same base images.
pub fn entrypoint_for(language: Language) -> LanguageEntrypoint {
    match language {
        Language::Python => LanguageEntrypoint {
            image: "python:3.11-slim",
            file_name: "skill.py",
            command: &["python3", "skill.py"],
        },
        Language::Typescript => LanguageEntrypoint {
            image: "node:20-slim",
            file_name: "skill.ts",
            command: &["npx", "-y", "ts-node", "skill.ts"],
        },
        Language::Go => LanguageEntrypoint {
            image: "golang:1.21-alpine",
            file_name: "skill.go",
            command: &["go", "run", "skill.go"],
        },
        Language::Java => LanguageEntrypoint {
            image: "openjdk:21-slim",
            file_name: "Skill.java",
            command: &["sh", "-c", "javac Skill.java && java Skill"],
        },
        Language::Rust => LanguageEntrypoint {
            image: "rust:1.75-slim",
            file_name: "skill.rs",
            command: &["sh", "-c", "rustc -O skill.rs -o skill_bin && ./skill_bin"],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_language_has_an_entrypoint() {
        for lang in [
            Language::Python,
            Language::Typescript,
            Language::Go,
            Language::Java,
            Language::Rust,
        ] {
            let ep = entrypoint_for(lang);
            assert!(!ep.image.is_empty());
            assert!(!ep.command.is_empty());
        }
    }
}
