use std::fmt;
use std::str::FromStr;

pub const FIELD_NAME: &str = "metadata.name";
pub const FIELD_NAMESPACE: &str = "metadata.namespace";

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    #[error("invalid field selector term: {0}")]
    InvalidTerm(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOperator {
    Equals,
    NotEquals,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRequirement {
    pub field: String,
    pub operator: FieldOperator,
    pub value: String,
}

impl FieldRequirement {
    pub fn matches(&self, actual: Option<&str>) -> bool {
        let equal = actual == Some(self.value.as_str());
        match self.operator {
            FieldOperator::Equals => equal,
            FieldOperator::NotEquals => !equal,
        }
    }
}

impl fmt::Display for FieldRequirement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let op = match self.operator {
            FieldOperator::Equals => "=",
            FieldOperator::NotEquals => "!=",
        };
        write!(f, "{}{}{}", self.field, op, self.value)
    }
}

/// Conjunction of field requirements, rendered as `a=b,c!=d`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelector {
    requirements: Vec<FieldRequirement>,
}

impl FieldSelector {
    pub fn equals(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::default().and_equals(field, value)
    }

    pub fn and_equals(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.requirements.push(FieldRequirement {
            field: field.into(),
            operator: FieldOperator::Equals,
            value: value.into(),
        });
        self
    }

    pub fn and_not_equals(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.requirements.push(FieldRequirement {
            field: field.into(),
            operator: FieldOperator::NotEquals,
            value: value.into(),
        });
        self
    }

    pub fn requirements(&self) -> &[FieldRequirement] {
        &self.requirements
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let mut selector = Self::default();
        for term in input.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let (field, operator, value) = if let Some((field, value)) = term.split_once("!=") {
                (field, FieldOperator::NotEquals, value)
            } else if let Some((field, value)) = term.split_once("==") {
                (field, FieldOperator::Equals, value)
            } else if let Some((field, value)) = term.split_once('=') {
                (field, FieldOperator::Equals, value)
            } else {
                return Err(SelectorError::InvalidTerm(term.to_owned()));
            };

            let field = field.trim();
            if field.is_empty() {
                return Err(SelectorError::InvalidTerm(term.to_owned()));
            }

            selector.requirements.push(FieldRequirement {
                field: field.to_owned(),
                operator,
                value: value.trim().to_owned(),
            });
        }
        Ok(selector)
    }
}

impl FromStr for FieldSelector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for FieldSelector {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let terms: Vec<String> = self.requirements.iter().map(|r| r.to_string()).collect();
        write!(f, "{}", terms.join(","))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_render() {
        let selector = FieldSelector::equals(FIELD_NAME, "helm-controller")
            .and_not_equals(FIELD_NAMESPACE, "kube-system");
        assert_eq!(
            selector.to_string(),
            "metadata.name=helm-controller,metadata.namespace!=kube-system"
        );
    }

    #[test]
    fn test_parse() {
        let selector: FieldSelector = "metadata.annotations.hello==world, metadata.name!=x"
            .parse()
            .expect("parse");
        assert_eq!(selector.requirements().len(), 2);
        assert_eq!(selector.requirements()[0].operator, FieldOperator::Equals);
        assert_eq!(selector.requirements()[0].value, "world");
        assert_eq!(selector.requirements()[1].operator, FieldOperator::NotEquals);

        assert!(FieldSelector::parse("").expect("empty").is_empty());
        assert!(FieldSelector::parse("novalue").is_err());
        assert!(FieldSelector::parse("=value").is_err());
    }

    #[test]
    fn test_requirement_matches() {
        let selector = FieldSelector::equals(FIELD_NAME, "a").and_not_equals(FIELD_NAMESPACE, "b");
        let [name, namespace] = selector.requirements() else {
            panic!("two requirements");
        };
        assert!(name.matches(Some("a")));
        assert!(!name.matches(None));
        assert!(namespace.matches(None));
        assert!(!namespace.matches(Some("b")));
    }
}
