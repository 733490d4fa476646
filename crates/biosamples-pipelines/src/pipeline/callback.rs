//! Completion callbacks

use super::result::TaskResult;

/// Receives every final task result of a run, one at a time, on the
/// runner's thread.
pub trait PipelineCallback {
    fn call(&mut self, result: &TaskResult);
}

impl<F> PipelineCallback for F
where
    F: FnMut(&TaskResult),
{
    fn call(&mut self, result: &TaskResult) {
        self(result)
    }
}

/// Running totals over completed tasks
#[derive(Debug, Default, Clone)]
pub struct PipelineFutureCallback {
    completed: u64,
    total_changes: u64,
    failed_identifiers: Vec<String>,
}

impl PipelineFutureCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub fn total_changes(&self) -> u64 {
        self.total_changes
    }

    pub fn failed_count(&self) -> u64 {
        self.failed_identifiers.len() as u64
    }

    pub fn failed_identifiers(&self) -> &[String] {
        &self.failed_identifiers
    }

    pub(crate) fn into_failed_identifiers(self) -> Vec<String> {
        self.failed_identifiers
    }
}

impl PipelineCallback for PipelineFutureCallback {
    fn call(&mut self, result: &TaskResult) {
        self.completed += 1;
        if result.success {
            self.total_changes += result.change_count as u64;
        } else {
            self.failed_identifiers.push(result.identifier.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_future_callback_totals() {
        let mut callback = PipelineFutureCallback::new();
        callback.call(&TaskResult::success("a", 2));
        callback.call(&TaskResult::failure("b"));
        callback.call(&TaskResult::success("c", 0));

        assert_eq!(callback.completed(), 3);
        assert_eq!(callback.total_changes(), 2);
        assert_eq!(callback.failed_identifiers(), ["b".to_string()]);
    }

    #[test]
    fn test_closure_callback() {
        let mut seen = Vec::new();
        let mut callback = |r: &TaskResult| seen.push(r.identifier.clone());
        PipelineCallback::call(&mut callback, &TaskResult::success("a", 1));
        assert_eq!(seen, vec!["a".to_string()]);
    }
}
