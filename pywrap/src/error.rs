//! Structural validation errors.
//!
//! Every generator-side failure is a structural defect in the interface
//! description, detected eagerly during traversal. None are recoverable
//! within a pass: the caller fixes the description and re-runs. An
//! unrecognized declaration kind never reaches the traversal — it fails
//! at deserialization.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenError {
    #[error("variables are not allowed at module scope, use a const (`{0}`)")]
    TopLevelVar(String),

    #[error("property `{0}` has a setter, but no getter")]
    SetterWithoutGetter(String),

    #[error("static properties are not supported (`{0}`)")]
    StaticProperty(String),

    #[error("multiple inheritance is not supported (class `{0}`)")]
    MultipleInheritance(String),

    #[error("a replacement base must have a C++ name (class `{0}`)")]
    ReplacementWithoutCppName(String),

    #[error("final class `{0}` can't have virtual methods")]
    FinalClassVirtual(String),

    #[error(
        "a constructor should be declared for `{0}` as it has virtual method declarations"
    )]
    VirtualWithoutConstructor(String),

    #[error("`__iter__` class `{0}` must have exactly one `def __next__`, found {1}")]
    MalformedIterator(String, String),

    #[error("`__iter__` class `{0}` can't be derived, base `{1}` found")]
    IteratorWithBase(String, String),

    #[error("constructor `{0}` must not declare return values")]
    ConstructorReturns(String),

    #[error("function `{0}` with an ignored return value declares {1} returns")]
    IgnoredReturnCount(String, usize),

    #[error("context manager method `{0}` can't be a classmethod")]
    CtxMgrClassmethod(String),

    #[error("class `{0}` has a trivial destructor yet requests an async destructor")]
    AsyncDtorTrivial(String),

    #[error("duplicate method symbol `{0}` in `{1}`")]
    DuplicateSymbol(String, String),

    // Internal invariant breach, not an input defect.
    #[error("internal: namespace frame stack not exhausted at end of pass")]
    FrameStackNotEmpty,
}
