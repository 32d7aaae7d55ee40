//! Shell actions exposed to the control endpoints.

/// Operations the control server may trigger on the running shell.
///
/// Implementations enqueue work onto the UI context and return without
/// waiting for it.
pub trait ShellControl: Send + Sync {
    /// Loads `page` in the embedded view.
    fn navigate(&self, page: &str);

    /// Loads the diagnostic page.
    fn show_errors(&self);

    /// Shuts the window down and terminates the process with exit code 0.
    fn terminate(&self);
}
