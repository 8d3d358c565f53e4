//! Hot-patchability checks.

use livepatch_classfile::{ClassModel, MethodModel};
use livepatch_diff::ClassDiff;

use crate::classify::{ClassKind, Classification};
use crate::error::{RejectReason, RejectedEdit};

/// Checks whether replacing `old` with `new` can be hot-patched.
///
/// `old` is `None` for classes without a baseline. `is_first_observation` is
/// `true` the first time the class is compared during the session, when the
/// baseline is the deployed build and initializer changes are expected noise.
/// Returns the first violation found.
pub fn validate(
    old: Option<&ClassModel>,
    new: &ClassModel,
    diff: Option<&ClassDiff>,
    classification: &Classification,
    is_first_observation: bool,
) -> Result<(), RejectedEdit> {
    let reject = |reason| Err(RejectedEdit::new(new.name.clone(), reason));

    if old.is_none() && classification.kind != ClassKind::Support {
        return reject(RejectReason::AddedClass);
    }

    let Some(diff) = diff else {
        return Ok(());
    };

    for modified in &diff.modified_methods {
        let inline = modified.new.is_inline || modified.old.is_inline;
        if inline && !modified.new.access.is_private() {
            return reject(RejectReason::ModifiedInlineFunction {
                method: modified.new.signature(),
            });
        }
    }

    if classification.kind == ClassKind::Normal {
        for modified in &diff.modified_methods {
            let method = &modified.new;
            if !method.is_constructor() && !method.is_class_init() {
                continue;
            }
            if is_first_observation {
                tracing::warn!(
                    class = %new.name,
                    method = %method.signature(),
                    "initializer differs from the deployed build; accepting on first observation"
                );
                continue;
            }
            return reject(initializer_reason(method));
        }
    }

    if classification.is_enum_switch_map() && diff.modified_methods.iter().any(|m| m.new.is_class_init()) {
        return reject(RejectReason::ModifiedEnumMapping);
    }

    Ok(())
}

fn initializer_reason(method: &MethodModel) -> RejectReason {
    if method.is_class_init() {
        RejectReason::ModifiedStaticInitializer
    } else {
        RejectReason::ModifiedConstructor {
            method: method.signature(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{ChangeClassifier, SupportRule};
    use livepatch_classfile::code::opcodes::{POP, RETURN};
    use livepatch_classfile::{AccessFlags, ClassWriter, CodeOp, MethodDef, CLASS_INIT, CONSTRUCTOR};
    use livepatch_diff::diff;

    const INLINE: &str = "Lkotlin/internal/InlineOnly;";

    fn class(name: &str, super_name: &str, methods: &[(&str, AccessFlags, bool, i32)]) -> ClassModel {
        let mut w = ClassWriter::new(name, Some(super_name));
        for (method, access, inline, value) in methods {
            let mut def = MethodDef::new(*access, method, "()V").code(vec![
                CodeOp::Iconst(*value),
                CodeOp::Raw(POP),
                CodeOp::Raw(RETURN),
            ]);
            if *inline {
                def = def.annotation(INLINE, false);
            }
            w.method(def);
        }
        ClassModel::parse(&w.finish()).unwrap()
    }

    fn check(old: &ClassModel, new: &ClassModel, first: bool) -> Result<(), RejectedEdit> {
        let classification = ChangeClassifier::default().classify(new);
        validate(Some(old), new, diff(old, new).as_ref(), &classification, first)
    }

    #[test]
    fn new_normal_class_is_rejected() {
        let new = class("a/Added", "java/lang/Object", &[]);
        let err = validate(None, &new, None, &Classification::NORMAL, true).unwrap_err();
        assert_eq!(err.reason, RejectReason::AddedClass);
        assert_eq!(err.class, "a/Added");
    }

    #[test]
    fn new_support_class_is_accepted() {
        let new = class("a/MainKt$f$1", "kotlin/jvm/internal/Lambda", &[]);
        let c = ChangeClassifier::default().classify(&new);
        assert!(validate(None, &new, None, &c, false).is_ok());
    }

    #[test]
    fn private_inline_change_is_accepted() {
        let old = class("a/Util", "java/lang/Object", &[("twice", AccessFlags::PRIVATE, true, 1)]);
        let new = class("a/Util", "java/lang/Object", &[("twice", AccessFlags::PRIVATE, true, 2)]);
        assert!(check(&old, &new, false).is_ok());
    }

    #[test]
    fn public_inline_change_is_rejected() {
        let old = class("a/Util", "java/lang/Object", &[("twice", AccessFlags::PUBLIC, true, 1)]);
        let new = class("a/Util", "java/lang/Object", &[("twice", AccessFlags::PUBLIC, true, 2)]);
        let err = check(&old, &new, false).unwrap_err();
        assert_eq!(
            err.reason,
            RejectReason::ModifiedInlineFunction {
                method: "twice()V".to_string()
            }
        );
    }

    #[test]
    fn constructor_change_rejected_after_first_observation() {
        let flags = AccessFlags::PUBLIC;
        let old = class("a/Model", "java/lang/Object", &[(CONSTRUCTOR, flags, false, 1)]);
        let new = class("a/Model", "java/lang/Object", &[(CONSTRUCTOR, flags, false, 2)]);
        assert!(check(&old, &new, true).is_ok());
        let err = check(&old, &new, false).unwrap_err();
        assert_eq!(err.reason.code(), "LP003");
    }

    #[test]
    fn static_initializer_change_rejected() {
        let flags = AccessFlags::STATIC;
        let old = class("a/Model", "java/lang/Object", &[(CLASS_INIT, flags, false, 1)]);
        let new = class("a/Model", "java/lang/Object", &[(CLASS_INIT, flags, false, 2)]);
        let err = check(&old, &new, false).unwrap_err();
        assert_eq!(err.reason, RejectReason::ModifiedStaticInitializer);
    }

    #[test]
    fn support_class_constructor_change_is_accepted() {
        let flags = AccessFlags::PUBLIC;
        let old = class("a/B$1", "kotlin/jvm/internal/Lambda", &[(CONSTRUCTOR, flags, false, 1)]);
        let new = class("a/B$1", "kotlin/jvm/internal/Lambda", &[(CONSTRUCTOR, flags, false, 2)]);
        assert!(check(&old, &new, false).is_ok());
    }

    #[test]
    fn enum_mapping_change_is_rejected_even_on_first_observation() {
        let flags = AccessFlags::STATIC;
        let old = class("a/S$WhenMappings", "java/lang/Object", &[(CLASS_INIT, flags, false, 1)]);
        let new = class("a/S$WhenMappings", "java/lang/Object", &[(CLASS_INIT, flags, false, 2)]);
        let c = ChangeClassifier::default().classify(&new);
        assert_eq!(c.rule, Some(SupportRule::EnumSwitchMap));
        let err = check(&old, &new, true).unwrap_err();
        assert_eq!(err.reason, RejectReason::ModifiedEnumMapping);
    }

    #[test]
    fn unchanged_class_is_accepted() {
        let old = class("a/Util", "java/lang/Object", &[("twice", AccessFlags::PUBLIC, true, 1)]);
        assert!(check(&old, &old, false).is_ok());
    }
}
