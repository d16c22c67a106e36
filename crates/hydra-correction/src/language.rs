// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Py,
    Js,
    Ts,
    Rs,
    Go,
    Java,
    C,
    Cpp,
    Sh,
    Unknown,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Language::Py => "py",
            Language::Js => "js",
            Language::Ts => "ts",
            Language::Rs => "rs",
            Language::Go => "go",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Sh => "sh",
            Language::Unknown => "unknown",
        }
    }

    /// Parse a language name as it would appear in a fence tag or an
    /// explicit `language` request field (case-insensitive, common aliases).
    pub fn from_name(tag: &str) -> Option<Language> {
        match tag.trim().to_lowercase().as_str() {
            "python" | "py" => Some(Language::Py),
            "javascript" | "js" => Some(Language::Js),
            "typescript" | "ts" => Some(Language::Ts),
            "rust" | "rs" => Some(Language::Rs),
            "go" | "golang" => Some(Language::Go),
            "java" => Some(Language::Java),
            "c" => Some(Language::C),
            "cpp" | "c++" | "cxx" => Some(Language::Cpp),
            "sh" | "bash" | "shell" => Some(Language::Sh),
            _ => None,
        }
    }
}

const KEYWORD_HINTS: &[(&str, Language)] = &[
    ("def ", Language::Py),
    ("import numpy", Language::Py),
    ("elif ", Language::Py),
    ("console.log", Language::Js),
    ("require(", Language::Js),
    ("interface ", Language::Ts),
    (": string", Language::Ts),
    ("fn main", Language::Rs),
    ("let mut", Language::Rs),
    ("func main", Language::Go),
    ("package main", Language::Go),
    ("public static void main", Language::Java),
    ("#include <stdio.h>", Language::C),
    ("#include <iostream>", Language::Cpp),
    ("std::", Language::Cpp),
    ("#!/bin/sh", Language::Sh),
    ("#!/bin/bash", Language::Sh),
];

/// Detect the language a prompt is asking for. Checks fenced code-block
/// language tags first (most reliable signal), then falls back to a small
/// keyword list. Ambiguous or absent signals yield `Language::Unknown`.
pub fn detect_language(prompt: &str) -> Language {
    for line in prompt.lines() {
        if let Some(tag) = line.trim().strip_prefix("```") {
            if let Some(lang) = Language::from_name(tag) {
                return lang;
            }
        }
    }
    let lower = prompt.to_lowercase();
    for (needle, lang) in KEYWORD_HINTS {
        if lower.contains(needle) {
            return *lang;
        }
    }
    Language::Unknown
}
