#[cfg(feature = "backtrace")]
use std::backtrace::Backtrace;
#[cfg(feature = "backtrace")]
use std::backtrace::BacktraceStatus;
use std::borrow::Cow;
use std::error;
use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::result;


mod private {
    use super::*;

    pub trait Sealed {}

    impl<T> Sealed for Option<T> {}
    impl<T, E> Sealed for result::Result<T, E> {}
    impl Sealed for &'static str {}
    impl Sealed for String {}
    impl Sealed for Error {}
}


/// A result type using our [`Error`] by default.
pub type Result<T, E = Error> = result::Result<T, E>;


/// An enum providing a rough classification of errors.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// An entity was not found, for example a runtime table.
    NotFound,
    /// A parameter was incorrect.
    InvalidInput,
    /// Data not valid for the operation were encountered.
    InvalidData,
    /// The operation is not supported.
    Unsupported,
    /// Input contradicted state that the rest of the system relies on,
    /// e.g., an overlapping memory mapping.
    ///
    /// Errors of this kind must never be ignored: continuing would
    /// produce silently wrong trace data.
    CorruptInput,
    /// A query plan was rejected because its constraints cannot be
    /// satisfied by the table, e.g., a missing table function argument.
    ///
    /// The SQL engine may decide to re-plan the query.
    Constraint,
    /// A custom error that does not fall under any other error kind.
    Other,
}

impl ErrorKind {
    /// Retrieve a textual representation of the error kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "entity not found",
            Self::InvalidInput => "invalid input parameter",
            Self::InvalidData => "invalid data",
            Self::Unsupported => "unsupported",
            Self::CorruptInput => "corrupt input",
            Self::Constraint => "constraint failed",
            Self::Other => "other error",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}


/// A trait for types convertible into a `Cow<'static, str>`.
pub trait IntoCowStr: private::Sealed {
    /// Perform the conversion.
    fn into_cow_str(self) -> Cow<'static, str>;
}

impl IntoCowStr for &'static str {
    fn into_cow_str(self) -> Cow<'static, str> {
        Cow::Borrowed(self)
    }
}

impl IntoCowStr for String {
    fn into_cow_str(self) -> Cow<'static, str> {
        Cow::Owned(self)
    }
}


enum ErrorImpl {
    Base {
        kind: ErrorKind,
        message: Cow<'static, str>,
        #[cfg(feature = "backtrace")]
        backtrace: Backtrace,
    },
    Context {
        context: Cow<'static, str>,
        source: Box<ErrorImpl>,
    },
}

impl ErrorImpl {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Base { kind, .. } => *kind,
            Self::Context { source, .. } => source.kind(),
        }
    }

    #[cfg(feature = "backtrace")]
    fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            Self::Base { backtrace, .. } => {
                (backtrace.status() == BacktraceStatus::Captured).then_some(backtrace)
            }
            Self::Context { source, .. } => source.backtrace(),
        }
    }
}

impl Debug for ErrorImpl {
    // We try to mirror roughly how anyhow's Error is behaving, because
    // that makes the most sense.
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        if f.alternate() {
            match self {
                Self::Base { kind, message, .. } => f
                    .debug_struct("Base")
                    .field("kind", kind)
                    .field("message", message)
                    .finish(),
                Self::Context { context, source } => f
                    .debug_struct("Context")
                    .field("context", context)
                    .field("source", source)
                    .finish(),
            }
        } else {
            let () = Display::fmt(self, f)?;

            if let Self::Context { source, .. } = self {
                let () = write!(f, "\n\nCaused by:")?;

                let mut error = Some(&**source);
                while let Some(err) = error {
                    let () = write!(f, "\n    ")?;
                    match err {
                        Self::Base { .. } => {
                            let () = Display::fmt(err, f)?;
                            error = None;
                        }
                        Self::Context { context, source } => {
                            let () = f.write_str(context)?;
                            error = Some(source);
                        }
                    }
                }
            }

            #[cfg(feature = "backtrace")]
            {
                if let Some(backtrace) = self.backtrace() {
                    let () = write!(f, "\n\nStack backtrace:\n{backtrace}")?;
                }
            }
            Ok(())
        }
    }
}

impl Display for ErrorImpl {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Base { kind, message, .. } => {
                if message.is_empty() {
                    Display::fmt(kind, f)
                } else {
                    f.write_str(message)
                }
            }
            Self::Context { context, source } => {
                let () = f.write_str(context)?;
                if f.alternate() {
                    let () = f.write_str(": ")?;
                    write!(f, "{source:#}")
                } else {
                    Ok(())
                }
            }
        }
    }
}

impl error::Error for ErrorImpl {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Base { .. } => None,
            Self::Context { source, .. } => Some(source.as_ref()),
        }
    }
}


/// The error type used by the library.
///
/// Errors generally form a chain, with higher-level errors typically
/// providing additional context for lower level ones. E.g., a query
/// error may be caused by a malformed regular expression literal.
///
/// The [`Display`] representation of an error reports the top-most
/// context only. Use the alternate form (`{:#}`) to print the entire
/// chain, or the [`Debug`] representation for a multi-line version.
pub struct Error {
    /// The top-most error of the chain.
    error: Box<ErrorImpl>,
}

impl Error {
    /// Create a new error of the provided kind.
    pub(crate) fn new<M>(kind: ErrorKind, message: M) -> Self
    where
        M: IntoCowStr,
    {
        Self {
            error: Box::new(ErrorImpl::Base {
                kind,
                message: message.into_cow_str(),
                #[cfg(feature = "backtrace")]
                backtrace: Backtrace::capture(),
            }),
        }
    }

    #[inline]
    pub(crate) fn with_invalid_input<M>(message: M) -> Self
    where
        M: IntoCowStr,
    {
        Self::new(ErrorKind::InvalidInput, message)
    }

    #[inline]
    pub(crate) fn with_invalid_data<M>(message: M) -> Self
    where
        M: IntoCowStr,
    {
        Self::new(ErrorKind::InvalidData, message)
    }

    #[inline]
    pub(crate) fn with_corrupt_input<M>(message: M) -> Self
    where
        M: IntoCowStr,
    {
        Self::new(ErrorKind::CorruptInput, message)
    }

    #[inline]
    pub(crate) fn with_constraint<M>(message: M) -> Self
    where
        M: IntoCowStr,
    {
        Self::new(ErrorKind::Constraint, message)
    }

    /// Retrieve a rough error classification in the form of an
    /// [`ErrorKind`].
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    /// Check whether this error reports a violated structural invariant
    /// ([`ErrorKind::CorruptInput`]).
    #[inline]
    pub fn is_corrupt_input(&self) -> bool {
        self.kind() == ErrorKind::CorruptInput
    }

    /// Layer the provided context on top of this error.
    fn layer_context(self, context: Cow<'static, str>) -> Self {
        Self {
            error: Box::new(ErrorImpl::Context {
                context,
                source: self.error,
            }),
        }
    }
}

impl Debug for Error {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        Debug::fmt(&self.error, f)
    }
}

impl Display for Error {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        Display::fmt(&self.error, f)
    }
}

impl error::Error for Error {
    #[inline]
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.error.source()
    }
}


/// A trait providing ergonomic chaining capabilities to [`Error`].
pub trait ErrorExt: private::Sealed {
    /// The output type produced by [`context`](Self::context) and
    /// [`with_context`](Self::with_context).
    type Output;

    /// Add context to this error.
    // If we had specialization of sorts we could be more lenient as to
    // what we can accept, but for now this method always works with
    // static strings and nothing else.
    fn context<C>(self, context: C) -> Self::Output
    where
        C: IntoCowStr;

    /// Add context to this error, using a closure for lazy evaluation.
    fn with_context<C, F>(self, f: F) -> Self::Output
    where
        C: IntoCowStr,
        F: FnOnce() -> C;
}

impl ErrorExt for Error {
    type Output = Error;

    fn context<C>(self, context: C) -> Self::Output
    where
        C: IntoCowStr,
    {
        self.layer_context(context.into_cow_str())
    }

    fn with_context<C, F>(self, f: F) -> Self::Output
    where
        C: IntoCowStr,
        F: FnOnce() -> C,
    {
        self.layer_context(f().into_cow_str())
    }
}

impl<T, E> ErrorExt for Result<T, E>
where
    E: ErrorExt,
{
    type Output = Result<T, E::Output>;

    fn context<C>(self, context: C) -> Self::Output
    where
        C: IntoCowStr,
    {
        match self {
            Ok(val) => Ok(val),
            Err(err) => Err(err.context(context)),
        }
    }

    fn with_context<C, F>(self, f: F) -> Self::Output
    where
        C: IntoCowStr,
        F: FnOnce() -> C,
    {
        match self {
            Ok(val) => Ok(val),
            Err(err) => Err(err.with_context(f)),
        }
    }
}


/// A trait providing conversion shortcuts for creating `Error`
/// instances.
pub trait IntoError<T>: private::Sealed
where
    Self: Sized,
{
    /// Convert `self` into a `Result`, producing an error of the given
    /// kind in case of a `None`.
    fn ok_or_error<C, F>(self, kind: ErrorKind, f: F) -> Result<T>
    where
        C: IntoCowStr,
        F: FnOnce() -> C;

    /// Shortcut for [`IntoError::ok_or_error`] with
    /// [`ErrorKind::InvalidInput`].
    #[inline]
    fn ok_or_invalid_input<C, F>(self, f: F) -> Result<T>
    where
        C: IntoCowStr,
        F: FnOnce() -> C,
    {
        self.ok_or_error(ErrorKind::InvalidInput, f)
    }

    /// Shortcut for [`IntoError::ok_or_error`] with
    /// [`ErrorKind::NotFound`].
    #[inline]
    fn ok_or_not_found<C, F>(self, f: F) -> Result<T>
    where
        C: IntoCowStr,
        F: FnOnce() -> C,
    {
        self.ok_or_error(ErrorKind::NotFound, f)
    }

    /// Shortcut for [`IntoError::ok_or_error`] with
    /// [`ErrorKind::CorruptInput`].
    #[inline]
    fn ok_or_corrupt_input<C, F>(self, f: F) -> Result<T>
    where
        C: IntoCowStr,
        F: FnOnce() -> C,
    {
        self.ok_or_error(ErrorKind::CorruptInput, f)
    }
}

impl<T> IntoError<T> for Option<T> {
    #[inline]
    fn ok_or_error<C, F>(self, kind: ErrorKind, f: F) -> Result<T>
    where
        C: IntoCowStr,
        F: FnOnce() -> C,
    {
        self.ok_or_else(|| Error::new(kind, f()))
    }
}
