//! Test harness for multi-case integration scenarios
//!
//! Runs each case, records how long it took and why it failed, and prints
//! a summary so a failing scenario names every broken case at once.

use std::time::Instant;

/// Outcome of one case
#[derive(Debug, Clone)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub duration_us: u128,
    pub error_message: Option<String>,
}

#[derive(Default)]
pub struct TestHarness {
    results: Vec<TestResult>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a single test case
    pub fn run_test<F>(&mut self, name: &str, test_fn: F)
    where
        F: FnOnce() -> Result<(), String>,
    {
        let started = Instant::now();
        let result = test_fn();

        self.results.push(TestResult {
            name: name.to_string(),
            passed: result.is_ok(),
            duration_us: started.elapsed().as_micros(),
            error_message: result.err(),
        });
    }

    /// Run the same case for every parameter
    pub fn run_parameterized_test<T, F>(&mut self, name: &str, params: &[T], test_fn: F)
    where
        T: core::fmt::Debug,
        F: Fn(&T) -> Result<(), String>,
    {
        for param in params {
            self.run_test(&format!("{}[{:?}]", name, param), || test_fn(param));
        }
    }

    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    pub fn print_summary(&self) {
        let total = self.results.len();
        let passed = self.results.iter().filter(|r| r.passed).count();

        println!("\nTest Results: {}/{} passed", passed, total);
        for result in &self.results {
            let mark = if result.passed { "ok  " } else { "FAIL" };
            println!("  {} {} ({} us)", mark, result.name, result.duration_us);
            if let Some(msg) = &result.error_message {
                println!("       {}", msg);
            }
        }
    }
}

/// Turn a failed check into a harness error
pub fn ensure(condition: bool, message: impl Into<String>) -> Result<(), String> {
    if condition {
        Ok(())
    } else {
        Err(message.into())
    }
}
