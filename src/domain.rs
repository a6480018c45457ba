//! Domain vocabulary: difficulty, topics, languages, problems, analyses and chat turns.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::GenerationError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
  Easy,
  Medium,
  Hard,
}

impl Difficulty {
  pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

  pub fn as_str(self) -> &'static str {
    match self {
      Difficulty::Easy => "easy",
      Difficulty::Medium => "medium",
      Difficulty::Hard => "hard",
    }
  }
}

impl fmt::Display for Difficulty {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

macro_rules! closed_vocabulary {
  (
    $(#[$meta:meta])*
    $name:ident { $($variant:ident => ($value:literal, $label:literal)),+ $(,)? }
  ) => {
    $(#[$meta])*
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub enum $name {
      $(#[serde(rename = $value)] $variant,)+
    }

    impl $name {
      pub const ALL: &'static [$name] = &[$($name::$variant,)+];

      /// Wire value (what clients send and what prompts embed).
      pub fn as_str(self) -> &'static str {
        match self { $($name::$variant => $value,)+ }
      }

      /// Human-readable label for pickers.
      pub fn label(self) -> &'static str {
        match self { $($name::$variant => $label,)+ }
      }
    }

    impl fmt::Display for $name {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
      }
    }

    impl FromStr for $name {
      type Err = String;

      /// Case-insensitive, whitespace-tolerant lookup by value or label.
      fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Self::ALL
          .iter()
          .copied()
          .find(|v| v.as_str().eq_ignore_ascii_case(needle) || v.label().eq_ignore_ascii_case(needle))
          .ok_or_else(|| format!("unknown {}: '{}'", stringify!($name), needle))
      }
    }
  };
}

closed_vocabulary! {
  /// Languages a problem can be generated for.
  CodingLanguage {
    Javascript => ("javascript", "JavaScript"),
    Python => ("python", "Python"),
    Java => ("java", "Java"),
    Cpp => ("cpp", "C++"),
    Go => ("go", "Go"),
    Csharp => ("csharp", "C#"),
    Swift => ("swift", "Swift"),
    Kotlin => ("kotlin", "Kotlin"),
    Ruby => ("ruby", "Ruby"),
    Rust => ("rust", "Rust"),
    Scala => ("scala", "Scala"),
    Typescript => ("typescript", "TypeScript"),
    Php => ("php", "PHP"),
    Perl => ("perl", "Perl"),
  }
}

impl Default for CodingLanguage {
  fn default() -> Self { CodingLanguage::Javascript }
}

closed_vocabulary! {
  /// Data-structure and algorithm topics accepted by the problem generator.
  Topic {
    Arrays => ("Arrays", "Arrays"),
    Strings => ("Strings", "Strings"),
    LinkedLists => ("Linked Lists", "Linked Lists"),
    Trees => ("Trees", "Trees"),
    Graphs => ("Graphs", "Graphs"),
    HashTables => ("Hash Tables", "Hash Tables"),
    Sorting => ("Sorting", "Sorting"),
    Searching => ("Searching", "Searching"),
    DynamicProgramming => ("Dynamic Programming", "Dynamic Programming"),
    GreedyAlgorithms => ("Greedy Algorithms", "Greedy Algorithms"),
    Backtracking => ("Backtracking", "Backtracking"),
    BitManipulation => ("Bit Manipulation", "Bit Manipulation"),
    Stacks => ("Stacks", "Stacks"),
    Queues => ("Queues", "Queues"),
    Heaps => ("Heaps", "Heaps"),
    Tries => ("Tries", "Tries"),
    Math => ("Math", "Math"),
    Geometry => ("Geometry", "Geometry"),
    Matrix => ("Matrix", "Matrix"),
    TwoPointers => ("Two Pointers", "Two Pointers"),
    SlidingWindow => ("Sliding Window", "Sliding Window"),
    Recursion => ("Recursion", "Recursion"),
    DivideAndConquer => ("Divide and Conquer", "Divide and Conquer"),
    UnionFind => ("Union Find", "Union Find"),
    SegmentTrees => ("Segment Trees", "Segment Trees"),
    TopologicalSort => ("Topological Sort", "Topological Sort"),
    KadaneAlgorithm => ("Kadane Algorithm", "Kadane Algorithm"),
  }
}

/// Validated input of the generate-problem flow.
///
/// Only constructible through [`ProblemSpec::new`], so a spec with no topics never
/// reaches the model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProblemSpec {
  difficulty: Difficulty,
  topics: Vec<Topic>,
  language: CodingLanguage,
}

impl ProblemSpec {
  /// Parses topic tags against the closed vocabulary. Duplicates collapse, first
  /// occurrence wins the position.
  pub fn new<S: AsRef<str>>(
    difficulty: Difficulty,
    topics: &[S],
    language: CodingLanguage,
  ) -> Result<Self, GenerationError> {
    let mut parsed: Vec<Topic> = Vec::with_capacity(topics.len());
    for raw in topics {
      let topic = raw.as_ref().parse::<Topic>().map_err(GenerationError::InvalidSpec)?;
      if !parsed.contains(&topic) {
        parsed.push(topic);
      }
    }
    if parsed.is_empty() {
      return Err(GenerationError::InvalidSpec("at least one topic is required".into()));
    }
    Ok(Self { difficulty, topics: parsed, language })
  }

  pub fn difficulty(&self) -> Difficulty { self.difficulty }
  #[cfg(test)]
  pub fn topics(&self) -> &[Topic] { &self.topics }
  pub fn language(&self) -> CodingLanguage { self.language }

  pub fn topics_joined(&self) -> String {
    self.topics.iter().map(|t| t.as_str()).collect::<Vec<_>>().join(", ")
  }
}

/// A generated problem. `language` always equals the language that was requested.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
  pub title: String,
  pub description: String,
  pub constraints: String,
  pub examples: String,
  pub language: CodingLanguage,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
  pub code: String,
  pub language: CodingLanguage,
  pub problem_description: String,
}

/// Suggestions are kept in presentation order as returned by the model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
  pub suggestions: Vec<String>,
  pub overall_quality: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
  User,
  #[serde(alias = "model", alias = "bot")]
  Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
  pub role: ChatRole,
  pub text: String,
}

#[cfg(test)]
impl ChatTurn {
  pub fn user(text: impl Into<String>) -> Self {
    Self { role: ChatRole::User, text: text.into() }
  }

  pub fn assistant(text: impl Into<String>) -> Self {
    Self { role: ChatRole::Assistant, text: text.into() }
  }
}

/// A transcript entry as rendered by a client. `pending` marks the optimistic
/// assistant placeholder shown while a reply is outstanding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
  pub id: Uuid,
  pub role: ChatRole,
  pub text: String,
  #[serde(default)]
  pub pending: bool,
}

impl ChatMessage {
  pub fn settled(role: ChatRole, text: impl Into<String>) -> Self {
    Self { id: Uuid::new_v4(), role, text: text.into(), pending: false }
  }

  pub fn placeholder() -> Self {
    Self { id: Uuid::new_v4(), role: ChatRole::Assistant, text: String::new(), pending: true }
  }

  pub fn turn(&self) -> ChatTurn {
    ChatTurn { role: self.role, text: self.text.clone() }
  }
}

/// What the tutor knows about the problem being worked on. Every part is optional.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemContext {
  #[serde(default)]
  pub title: Option<String>,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub code: Option<String>,
}
