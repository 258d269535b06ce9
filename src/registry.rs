//! Instruction kinds, their Copilot settings keys, and the recognized languages.

/// Settings key that registers directories of `*.prompt.md` files.
pub const PROMPT_FILES_KEY: &str = "chat.promptFiles";

/// Settings key that tells Copilot to read instruction files.
pub const USE_INSTRUCTION_FILES_KEY: &str = "github.copilot.chat.codeGeneration.useInstructionFiles";

/// Store key used for prompts that are not scoped to a language.
pub const GLOBAL_KEY: &str = "global";

/// Languages and frameworks offered by the editor's language selector.
/// Not used to validate stored prompts.
pub const LANGUAGES: &[&str] = &[
    "python",
    "javascript",
    "typescript",
    "java",
    "c",
    "cpp",
    "csharp",
    "dart",
    "swift",
    "kotlin",
    "ruby",
    "php",
    "rust",
    "lua",
    "shellscript",
    "sql",
    "r",
    "html",
    "css",
    "scss",
    "sass",
    "react",
    "nextjs",
    "vue",
    "svelte",
    "angular",
    "flutter",
    "nodejs",
    "django",
    "flask",
    "express",
    "fastapi",
    "spring",
    "rails",
    "laravel",
    "unity",
    "unreal",
    "godot",
    "tensorflow",
    "pytorch",
    "arduino",
];

/// The kinds of instructions Copilot accepts from settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InstructionKind {
    CodeGeneration,
    TestGeneration,
    CodeReview,
    CommitMessage,
}

impl InstructionKind {
    /// Every kind, in selector order.
    pub const ALL: [InstructionKind; 4] = [
        Self::CodeGeneration,
        Self::TestGeneration,
        Self::CodeReview,
        Self::CommitMessage,
    ];

    /// Parse a kind from its store key (`CODE_REVIEW`) or its command-line
    /// spelling (`code-review`). Anything else is `None`.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim() {
            "CODE_GENERATION" | "code-generation" => Some(Self::CodeGeneration),
            "TEST_GENERATION" | "test-generation" => Some(Self::TestGeneration),
            "CODE_REVIEW" | "code-review" => Some(Self::CodeReview),
            "COMMIT_MESSAGE" | "commit-message" => Some(Self::CommitMessage),
            _ => None,
        }
    }

    /// Key used in the prompt store and in `.vscode/copilot.json`.
    pub fn key(&self) -> &'static str {
        match self {
            Self::CodeGeneration => "CODE_GENERATION",
            Self::TestGeneration => "TEST_GENERATION",
            Self::CodeReview => "CODE_REVIEW",
            Self::CommitMessage => "COMMIT_MESSAGE",
        }
    }

    /// Copilot settings key this kind is written to.
    pub fn setting_key(&self) -> &'static str {
        match self {
            Self::CodeGeneration => "github.copilot.chat.codeGeneration.instructions",
            Self::TestGeneration => "github.copilot.chat.testGeneration.instructions",
            Self::CodeReview => "github.copilot.chat.reviewSelection.instructions",
            Self::CommitMessage => "github.copilot.chat.commitMessageGeneration.instructions",
        }
    }

    /// Get the display label for this kind.
    pub fn label(&self) -> &'static str {
        match self {
            Self::CodeGeneration => "Code Generation",
            Self::TestGeneration => "Test Generation",
            Self::CodeReview => "Code Review",
            Self::CommitMessage => "Commit Messages",
        }
    }
}

impl std::fmt::Display for InstructionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Parse a kind for clap, listing the valid names on failure.
pub fn parse_kind_arg(name: &str) -> Result<InstructionKind, String> {
    InstructionKind::parse(name).ok_or_else(|| {
        let valid: Vec<&str> = InstructionKind::ALL.iter().map(|k| k.key()).collect();
        format!("unknown instruction kind '{}' (expected one of {})", name, valid.join(", "))
    })
}
