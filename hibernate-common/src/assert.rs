// Copyright 2026 hibernate Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Assertions on internal invariants.
//!
//! The macros expand in the calling crate, so it must declare a `strict_assertions` feature of its own.

/// `debug_assert!`, or `assert!` in builds with the `strict_assertions` feature.
#[macro_export]
macro_rules! strict_assert {
    ($($arg:tt)*) => {{
        #[cfg(feature = "strict_assertions")]
        ::std::assert!($($arg)*);
        #[cfg(not(feature = "strict_assertions"))]
        ::std::debug_assert!($($arg)*);
    }};
}

/// `debug_assert_eq!`, or `assert_eq!` in builds with the `strict_assertions` feature.
#[macro_export]
macro_rules! strict_assert_eq {
    ($($arg:tt)*) => {{
        #[cfg(feature = "strict_assertions")]
        ::std::assert_eq!($($arg)*);
        #[cfg(not(feature = "strict_assertions"))]
        ::std::debug_assert_eq!($($arg)*);
    }};
}
