//! Small cross-cutting helpers shared by the rest of the crate.

/// A short, human-readable rendering of a `std::any::type_name` string — strips the module path a
/// fully qualified type name carries, the same convention the rest of the crate's `Display` impls
/// use via `disqualified::ShortName`.
pub fn short_type_name_str(type_name: &str) -> disqualified::ShortName<'_> {
    disqualified::ShortName(type_name)
}

/// A convenience trait to log an error at the `tracing` level its variant calls for.
///
/// Implemented per error enum so each variant can pick its own severity, rather than flattening
/// everything to one level at the call site.
pub trait LogErr {
    /// Log an error with [`tracing`].
    fn log_err(&self);
    /// Log an error, then return self. This is for convenience with method chaining.
    fn and_log_err(self) -> Self
    where
        Self: Sized,
    {
        self.log_err();
        self
    }
}
impl<T, E: LogErr> LogErr for Result<T, E> {
    fn log_err(&self) {
        if let Err(err) = self {
            err.log_err();
        }
    }
}
