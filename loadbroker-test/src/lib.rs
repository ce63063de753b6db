/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

#![forbid(unsafe_code)]

//! Test utilities for Loadbroker.
//!
//! Brings in the [`loadbroker_test`](prelude::loadbroker_test) attribute, which
//! runs an async test on its own multi-threaded runtime with a deadline.

/// Everything a test module needs: `use loadbroker_test::prelude::*;`.
pub mod prelude {
    pub use loadbroker_test_macro::loadbroker_test;
}

#[doc(hidden)]
pub mod __private {
    pub use tokio;
    pub use tracing;

    /// Turns a test body's return value into pass or fail.
    pub trait TestResult {
        /// Panics if the value represents a failure.
        fn into_outcome(self);
    }

    impl TestResult for () {
        fn into_outcome(self) {}
    }

    impl<E: std::fmt::Debug> TestResult for Result<(), E> {
        fn into_outcome(self) {
            if let Err(error) = self {
                panic!("test returned an error: {error:?}");
            }
        }
    }
}
