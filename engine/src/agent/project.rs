//! Project type detection for the workspace banner and task framing.

use std::fs;
use std::path::Path;

use serde_json::Value;

/// Marker files per language, checked in this order
const LANGUAGE_MARKERS: &[(&str, &[&str])] = &[
    ("python", &["requirements.txt", "pyproject.toml", "setup.py", "Pipfile"]),
    ("javascript", &["package.json", "yarn.lock", "package-lock.json"]),
    ("go", &["go.mod", "go.sum"]),
    ("rust", &["Cargo.toml", "Cargo.lock"]),
    ("java", &["pom.xml", "build.gradle", "build.gradle.kts"]),
];

/// Extension fallback when no marker file exists
const EXTENSION_LANGUAGES: &[(&str, &str)] = &[
    ("py", "python"),
    ("js", "javascript"),
    ("jsx", "javascript"),
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("go", "go"),
    ("rs", "rust"),
    ("java", "java"),
];

const FRAMEWORKS: &[(&str, &str)] = &[
    ("react", "react"),
    ("vue", "vue"),
    ("next", "next.js"),
    ("@angular/core", "angular"),
    ("svelte", "svelte"),
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectInfo {
    pub language: Option<String>,
    pub framework: Option<String>,
    pub package_manager: Option<String>,
}

impl ProjectInfo {
    /// Inspect the root and its immediate non-hidden subdirectories.
    pub fn detect(root: &Path) -> Self {
        let mut info = Self::default();

        for (language, markers) in LANGUAGE_MARKERS {
            if markers.iter().any(|m| find_marker(root, m).is_some()) {
                info.language = Some(language.to_string());
                break;
            }
        }
        if info.language.as_deref() == Some("javascript")
            && find_marker(root, "tsconfig.json").is_some()
        {
            info.language = Some("typescript".to_string());
        }

        match info.language.as_deref() {
            Some("python") => {
                info.package_manager = [
                    ("requirements.txt", "pip"),
                    ("pyproject.toml", "poetry"),
                    ("Pipfile", "pipenv"),
                ]
                .iter()
                .find(|(marker, _)| find_marker(root, marker).is_some())
                .map(|(_, pm)| pm.to_string());
            }
            Some("javascript" | "typescript") => {
                info.framework = detect_framework(root);
                info.package_manager = [
                    ("yarn.lock", "yarn"),
                    ("pnpm-lock.yaml", "pnpm"),
                    ("package-lock.json", "npm"),
                    ("package.json", "npm"),
                ]
                .iter()
                .find(|(marker, _)| find_marker(root, marker).is_some())
                .map(|(_, pm)| pm.to_string());
            }
            Some("rust") => info.package_manager = Some("cargo".to_string()),
            Some("go") => info.package_manager = Some("go modules".to_string()),
            None => info.language = language_from_extensions(root),
            _ => {}
        }

        info
    }

    /// One-line description, e.g. "rust (cargo)" or "typescript/react (yarn)"
    pub fn summary(&self) -> String {
        let Some(language) = &self.language else {
            return "unknown".to_string();
        };
        let mut out = language.clone();
        if let Some(framework) = &self.framework {
            out.push('/');
            out.push_str(framework);
        }
        if let Some(pm) = &self.package_manager {
            out.push_str(&format!(" ({pm})"));
        }
        out
    }
}

fn find_marker(root: &Path, name: &str) -> Option<std::path::PathBuf> {
    let direct = root.join(name);
    if direct.exists() {
        return Some(direct);
    }
    fs::read_dir(root)
        .ok()?
        .filter_map(Result::ok)
        .filter(|e| e.path().is_dir())
        .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
        .map(|e| e.path().join(name))
        .find(|p| p.exists())
}

fn detect_framework(root: &Path) -> Option<String> {
    let manifest = find_marker(root, "package.json")?;
    let data: Value = serde_json::from_str(&fs::read_to_string(manifest).ok()?).ok()?;
    let has_dep = |dep: &str| {
        ["dependencies", "devDependencies"]
            .iter()
            .any(|section| data.get(section).and_then(|d| d.get(dep)).is_some())
    };
    FRAMEWORKS
        .iter()
        .find(|(dep, _)| has_dep(dep))
        .map(|(_, name)| name.to_string())
}

/// Most common known source extension in the top two directory levels
fn language_from_extensions(root: &Path) -> Option<String> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    let mut visit = |dir: &Path| -> Vec<std::path::PathBuf> {
        let mut subdirs = Vec::new();
        let Ok(entries) = fs::read_dir(dir) else {
            return subdirs;
        };
        for entry in entries.filter_map(Result::ok) {
            let path = entry.path();
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            if path.is_dir() {
                subdirs.push(path);
                continue;
            }
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            if let Some(&(_, language)) = EXTENSION_LANGUAGES.iter().find(|(e, _)| *e == ext) {
                match counts.iter_mut().find(|(l, _)| *l == language) {
                    Some((_, n)) => *n += 1,
                    None => counts.push((language, 1)),
                }
            }
        }
        subdirs
    };
    for sub in visit(root) {
        visit(&sub);
    }
    counts
        .into_iter()
        .max_by_key(|(_, n)| *n)
        .map(|(language, _)| language.to_string())
}
