use std::collections::HashMap;

use ecow::EcoString;

/// Host platform, exposed to `#if` as the matching built-in symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Windows,
    Linux,
    MacOs,
}

impl Platform {
    pub fn host() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Platform::Windows => "__WINDOWS__",
            Platform::Linux => "__LINUX__",
            Platform::MacOs => "__OSX__",
        }
    }

    pub fn is_builtin_symbol(name: &str) -> bool {
        matches!(name, "__WINDOWS__" | "__LINUX__" | "__OSX__")
    }
}

/// Environment variables visible to `exists(...)` and `#import`. Supplied as
/// a salsa input so evaluation never reads process state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Environment {
    vars: HashMap<EcoString, EcoString>,
}

impl Environment {
    pub fn set(&mut self, name: impl Into<EcoString>, value: impl Into<EcoString>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&EcoString> {
        self.vars.get(name)
    }
}

impl FromIterator<(EcoString, EcoString)> for Environment {
    fn from_iter<T: IntoIterator<Item = (EcoString, EcoString)>>(iter: T) -> Self {
        Self {
            vars: iter.into_iter().collect(),
        }
    }
}
