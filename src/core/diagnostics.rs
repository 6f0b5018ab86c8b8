/// Diagnostics collected during one export pass.
///
/// Only a dialog without exactly one root aborts an export. Everything else
/// is recorded here and rendering carries on.
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExportErrorKind {
    /// Fatal: the dialog does not have exactly one root node.
    RootNodeCountNotOne,
    /// Some node can never reach an end of the dialog.
    InfinityLoop,
    UnknownNodeType,
    UnknownConditionType,
    UnknownActionType,
    ConditionRenderFailed,
    ActionRenderFailed,
    MissingFlexField,
    MissingReferencedObject,
    MissingTemplate,
    /// A cycle with no function boundary on it, so it cannot be inlined.
    UnsplitCycle,
}

impl ExportErrorKind {
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::RootNodeCountNotOne)
    }
}

/// One deduplicated diagnostic as returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportDiagnostic {
    pub kind: ExportErrorKind,
    pub message: String,
    pub count: u32,
}

#[derive(Debug, Default)]
pub struct ErrorCollection {
    diagnostics: Vec<ExportDiagnostic>,
    context: Vec<String>,
}

impl ErrorCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic, attributed to the current context. Repeats of
    /// the same kind and message only bump the count.
    pub fn add(&mut self, kind: ExportErrorKind, message: impl Into<String>) {
        let message = match self.current_context() {
            Some(context) => format!("{}: {}", context, message.into()),
            None => message.into(),
        };
        tracing::debug!(?kind, %message, "export diagnostic");

        if let Some(existing) = self
            .diagnostics
            .iter_mut()
            .find(|d| d.kind == kind && d.message == message)
        {
            existing.count += 1;
            return;
        }
        self.diagnostics.push(ExportDiagnostic {
            kind,
            message,
            count: 1,
        });
    }

    /// The context chain, outermost first, joined with ` > `.
    pub fn current_context(&self) -> Option<String> {
        if self.context.is_empty() {
            None
        } else {
            Some(self.context.join(" > "))
        }
    }

    /// Push a context that stays active until the returned guard is dropped.
    pub fn push_context(&mut self, context: impl Into<String>) -> ContextGuard<'_> {
        self.context.push(context.into());
        ContextGuard { errors: self }
    }

    /// Run `f` with an extra context frame.
    pub fn with_context<R>(
        &mut self,
        context: impl Into<String>,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        let mut guard = self.push_context(context);
        f(&mut *guard)
    }

    /// Push a frame without a guard. Returns the depth to restore with
    /// [`ErrorCollection::restore_context`].
    pub(crate) fn enter_context(&mut self, context: impl Into<String>) -> usize {
        let depth = self.context.len();
        self.context.push(context.into());
        depth
    }

    pub(crate) fn restore_context(&mut self, depth: usize) {
        self.context.truncate(depth);
    }

    pub fn has(&self, kind: ExportErrorKind) -> bool {
        self.diagnostics.iter().any(|d| d.kind == kind)
    }

    /// Total occurrences of a kind, counting repeats.
    pub fn count_of(&self, kind: ExportErrorKind) -> u32 {
        self.diagnostics
            .iter()
            .filter(|d| d.kind == kind)
            .map(|d| d.count)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn diagnostics(&self) -> &[ExportDiagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<ExportDiagnostic> {
        self.diagnostics
    }
}

/// Pops its context frame when dropped, on every exit path.
pub struct ContextGuard<'e> {
    errors: &'e mut ErrorCollection,
}

impl Deref for ContextGuard<'_> {
    type Target = ErrorCollection;

    fn deref(&self) -> &ErrorCollection {
        self.errors
    }
}

impl DerefMut for ContextGuard<'_> {
    fn deref_mut(&mut self) -> &mut ErrorCollection {
        self.errors
    }
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        self.errors.context.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_diagnostics_are_counted() {
        let mut errors = ErrorCollection::new();
        errors.add(ExportErrorKind::UnknownActionType, "type 99");
        errors.add(ExportErrorKind::UnknownActionType, "type 99");
        errors.add(ExportErrorKind::UnknownActionType, "type 98");

        assert_eq!(errors.diagnostics().len(), 2);
        assert_eq!(errors.diagnostics()[0].count, 2);
        assert_eq!(errors.count_of(ExportErrorKind::UnknownActionType), 3);
    }

    #[test]
    fn context_is_prefixed_and_nested() {
        let mut errors = ErrorCollection::new();
        {
            let mut outer = errors.push_context("Dialog d1");
            outer.with_context("Check Npc Value", |inner| {
                inner.add(ExportErrorKind::MissingFlexField, "no field 'Mood'");
            });
            outer.add(ExportErrorKind::InfinityLoop, "node t1");
        }
        errors.add(ExportErrorKind::MissingTemplate, "TaleChoice");

        let messages: Vec<&str> = errors
            .diagnostics()
            .iter()
            .map(|d| d.message.as_str())
            .collect();
        assert_eq!(
            messages,
            vec![
                "Dialog d1 > Check Npc Value: no field 'Mood'",
                "Dialog d1: node t1",
                "TaleChoice",
            ]
        );
        assert!(errors.current_context().is_none());
    }

    #[test]
    fn context_is_restored_on_early_return() {
        fn fails(errors: &mut ErrorCollection) -> Result<(), ()> {
            let _guard = errors.push_context("scope");
            Err(())
        }

        let mut errors = ErrorCollection::new();
        assert!(fails(&mut errors).is_err());
        assert!(errors.current_context().is_none());
    }

    #[test]
    fn only_root_count_is_fatal() {
        assert!(ExportErrorKind::RootNodeCountNotOne.is_fatal());
        assert!(!ExportErrorKind::InfinityLoop.is_fatal());
        assert!(!ExportErrorKind::UnknownActionType.is_fatal());
    }
}
