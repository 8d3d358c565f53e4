//! Sorting classes into user code and compiler-generated support code.
//!
//! Support classes (lambdas, singleton lambda holders, enum-switch tables,
//! single-method interface shims) are created and renamed freely by the
//! compiler, so validation is relaxed for them. The rules below are
//! heuristics over the class shape and are evaluated in order; the first
//! match wins. A support class classified as normal only makes validation
//! stricter, so rule 3 is kept narrow.

use std::collections::HashSet;

use livepatch_classfile::{ClassModel, EnclosingMethod, MethodModel, Operand, CONSTRUCTOR};
use serde::Serialize;

/// Base classes of compiler-generated lambda and function-reference classes.
pub const DEFAULT_LAMBDA_SUPERTYPES: &[&str] = &[
    "kotlin/jvm/internal/Lambda",
    "kotlin/coroutines/jvm/internal/SuspendLambda",
    "kotlin/coroutines/jvm/internal/RestrictedSuspendLambda",
    "kotlin/jvm/internal/FunctionReferenceImpl",
    "kotlin/jvm/internal/PropertyReference0Impl",
];

/// Name fragment of classes holding singleton composable lambdas.
pub const SINGLETON_CONTAINER_MARKER: &str = "ComposableSingletons$";

/// Name suffix of enum-switch mapping tables.
pub const ENUM_SWITCH_MAP_SUFFIX: &str = "$WhenMappings";

/// Name prefix of the mapping arrays inside an enum-switch table.
pub const ENUM_SWITCH_FIELD_PREFIX: &str = "$EnumSwitchMapping$";

/// Descriptor of the composer parameter that identifies restart lambdas.
const COMPOSER_DESCRIPTOR: &str = "Landroidx/compose/runtime/Composer;";

/// Whether a class is user code or compiler-generated support code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClassKind {
    /// User-visible code, validated strictly.
    Normal,
    /// Compiler-generated code, validated leniently.
    Support,
}

/// The rule that made a class a support class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SupportRule {
    /// Extends a known lambda base class.
    LambdaSupertype,
    /// Holds singleton composable lambdas.
    SingletonContainer,
    /// Enum-switch mapping table.
    EnumSwitchMap,
    /// Local class implementing one interface with one public method.
    SamShim,
}

/// Result of classifying one class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    /// The kind.
    pub kind: ClassKind,
    /// The matching rule; `None` for normal classes.
    pub rule: Option<SupportRule>,
}

impl Classification {
    /// A normal class.
    pub const NORMAL: Classification = Classification {
        kind: ClassKind::Normal,
        rule: None,
    };

    fn support(rule: SupportRule) -> Self {
        Self {
            kind: ClassKind::Support,
            rule: Some(rule),
        }
    }

    /// Returns `true` for support classes.
    pub fn is_support(&self) -> bool {
        self.kind == ClassKind::Support
    }

    /// Returns `true` for enum-switch mapping tables.
    pub fn is_enum_switch_map(&self) -> bool {
        self.rule == Some(SupportRule::EnumSwitchMap)
    }
}

/// Ordered classification rules.
#[derive(Debug, Clone)]
pub struct ChangeClassifier {
    lambda_supertypes: HashSet<String>,
}

impl Default for ChangeClassifier {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl ChangeClassifier {
    /// Creates a classifier recognizing the built-in lambda base classes plus `extra`.
    pub fn new(extra_lambda_supertypes: &[String]) -> Self {
        let lambda_supertypes = DEFAULT_LAMBDA_SUPERTYPES
            .iter()
            .map(|s| s.to_string())
            .chain(extra_lambda_supertypes.iter().cloned())
            .collect();
        Self { lambda_supertypes }
    }

    /// Classifies one class.
    pub fn classify(&self, model: &ClassModel) -> Classification {
        if model
            .super_name
            .as_deref()
            .is_some_and(|s| self.lambda_supertypes.contains(s))
        {
            return Classification::support(SupportRule::LambdaSupertype);
        }
        if is_singleton_container(&model.name) {
            return Classification::support(SupportRule::SingletonContainer);
        }
        if model.name.ends_with(ENUM_SWITCH_MAP_SUFFIX)
            && model
                .fields
                .iter()
                .all(|f| f.name.starts_with(ENUM_SWITCH_FIELD_PREFIX))
        {
            return Classification::support(SupportRule::EnumSwitchMap);
        }
        if model.enclosing_method.is_some()
            && model.interfaces.len() == 1
            && model.methods.iter().filter(|m| is_sam_candidate(m)).count() == 1
        {
            return Classification::support(SupportRule::SamShim);
        }
        Classification::NORMAL
    }
}

fn is_sam_candidate(method: &MethodModel) -> bool {
    method.access.is_public()
        && !method.access.is_static()
        && !method.access.is_synthetic()
        && !method.access.is_bridge()
        && method.name != CONSTRUCTOR
}

/// Returns `true` for the classes holding singleton composable lambdas and
/// the lambdas nested in them.
pub fn is_singleton_container(class_name: &str) -> bool {
    class_name.contains(SINGLETON_CONTAINER_MARKER)
}

/// Returns `true` for the lambda the runtime stores to recompose a scope.
///
/// Such a lambda is a support class whose `invoke(Composer, int)` calls back
/// into its enclosing method. Content lambdas share the signature but run
/// their own body, so they do not count.
pub fn is_restart_lambda(model: &ClassModel, classification: &Classification) -> bool {
    if !classification.is_support() {
        return false;
    }
    let Some(EnclosingMethod {
        class: owner,
        method: Some((name, _)),
    }) = model.enclosing_method.as_ref()
    else {
        return false;
    };
    let prefix = format!("({COMPOSER_DESCRIPTOR}I)");
    model
        .methods
        .iter()
        .filter(|m| m.name == "invoke" && m.descriptor.starts_with(&prefix))
        .flat_map(|m| &m.instructions)
        .any(|insn| {
            matches!(&insn.operand, Operand::Member(target) if target.owner == *owner && target.name == *name)
        })
}
