//! Criterion operator taxonomy.

use std::fmt;

use crate::error::{DataProviderError, Result};

/// A criterion operator. Comparison operators come in families (equality,
/// ordering, regex, substring), each with negated and case-insensitive flavors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CriterionOperator {
    Equal,
    EqualNocase,
    NotEqual,
    NotEqualNocase,
    Lower,
    LowerOrEqual,
    Greater,
    GreaterOrEqual,
    Regex,
    RegexNocase,
    NotRegex,
    NotRegexNocase,
    Substr,
    SubstrNocase,
    NotSubstr,
    NotSubstrNocase,
    And,
    Or,
    Not,
}

use CriterionOperator::*;

impl CriterionOperator {
    /// Every comparison operator, in token order.
    pub const COMPARISONS: [CriterionOperator; 16] = [
        Equal,
        EqualNocase,
        NotEqual,
        NotEqualNocase,
        Lower,
        LowerOrEqual,
        Greater,
        GreaterOrEqual,
        Regex,
        RegexNocase,
        NotRegex,
        NotRegexNocase,
        Substr,
        SubstrNocase,
        NotSubstr,
        NotSubstrNocase,
    ];

    /// Resolve an operator token. `=` is accepted as an alias of `==`.
    pub fn from_token(token: &str) -> Result<Self> {
        Ok(match token {
            "=" | "==" => Equal,
            "=*" => EqualNocase,
            "!=" => NotEqual,
            "!=*" => NotEqualNocase,
            "<" => Lower,
            "<=" => LowerOrEqual,
            ">" => Greater,
            ">=" => GreaterOrEqual,
            "~" => Regex,
            "~*" => RegexNocase,
            "!~" => NotRegex,
            "!~*" => NotRegexNocase,
            "<>" => Substr,
            "<>*" => SubstrNocase,
            "!<>" => NotSubstr,
            "!<>*" => NotSubstrNocase,
            "&&" => And,
            "||" => Or,
            "!" => Not,
            other => return Err(DataProviderError::UnknownOperator(other.into())),
        })
    }

    pub fn token(&self) -> &'static str {
        match self {
            Equal => "==",
            EqualNocase => "=*",
            NotEqual => "!=",
            NotEqualNocase => "!=*",
            Lower => "<",
            LowerOrEqual => "<=",
            Greater => ">",
            GreaterOrEqual => ">=",
            Regex => "~",
            RegexNocase => "~*",
            NotRegex => "!~",
            NotRegexNocase => "!~*",
            Substr => "<>",
            SubstrNocase => "<>*",
            NotSubstr => "!<>",
            NotSubstrNocase => "!<>*",
            And => "&&",
            Or => "||",
            Not => "!",
        }
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, And | Or | Not)
    }

    pub fn is_equality(&self) -> bool {
        matches!(self, Equal | EqualNocase | NotEqual | NotEqualNocase)
    }

    pub fn is_ordering(&self) -> bool {
        matches!(self, Lower | LowerOrEqual | Greater | GreaterOrEqual)
    }

    pub fn is_regex(&self) -> bool {
        matches!(self, Regex | RegexNocase | NotRegex | NotRegexNocase)
    }

    pub fn is_substring(&self) -> bool {
        matches!(self, Substr | SubstrNocase | NotSubstr | NotSubstrNocase)
    }

    pub fn negated(&self) -> bool {
        matches!(
            self,
            NotEqual | NotEqualNocase | NotRegex | NotRegexNocase | NotSubstr | NotSubstrNocase
        )
    }

    pub fn case_insensitive(&self) -> bool {
        matches!(
            self,
            EqualNocase
                | NotEqualNocase
                | RegexNocase
                | NotRegexNocase
                | SubstrNocase
                | NotSubstrNocase
        )
    }

    /// The non-negated operator of the same family and case sensitivity.
    pub fn positive(&self) -> Self {
        match self {
            NotEqual => Equal,
            NotEqualNocase => EqualNocase,
            NotRegex => Regex,
            NotRegexNocase => RegexNocase,
            NotSubstr => Substr,
            NotSubstrNocase => SubstrNocase,
            other => *other,
        }
    }

    /// The case-sensitive operator of the same family and polarity.
    pub fn case_sensitive(&self) -> Self {
        match self {
            EqualNocase => Equal,
            NotEqualNocase => NotEqual,
            RegexNocase => Regex,
            NotRegexNocase => NotRegex,
            SubstrNocase => Substr,
            NotSubstrNocase => NotSubstr,
            other => *other,
        }
    }
}

impl fmt::Display for CriterionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}
