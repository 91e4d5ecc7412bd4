// ============================================================================
// cinder - Ergonomic Macros
// ============================================================================

/// Helper macro to clone variables into a move closure.
///
/// This reduces the boilerplate of manually cloning `Rc` or `Signal` types
/// before moving them into a closure.
///
/// # Usage
///
/// ```rust
/// use cinder::{cloned, signal, computed};
///
/// let a = signal(1);
/// let b = signal(2);
///
/// // Use:
/// let sum = computed(cloned!(a, b => move || a.get() + b.get()));
/// ```
#[macro_export]
macro_rules! cloned {
    ($($n:ident),+ => $e:expr) => {
        {
            $( let $n = $n.clone(); )+
            $e
        }
    };
}

/// Create a computed signal with automatic variable capturing.
///
/// Wraps `computed(cloned!(... => move || ...))`.
///
/// # Usage
///
/// ```rust
/// use cinder::{computed, signal};
/// let a = signal(1);
/// let b = signal(2);
///
/// // Clean syntax: list deps => expression
/// let sum = computed!(a, b => a.get() + b.get());
/// ```
#[macro_export]
macro_rules! computed {
    // Case 1: With dependencies
    ($($deps:ident),+ => $body:expr) => {
        $crate::computed($crate::cloned!($($deps),+ => move || $body))
    };
    // Case 2: No dependencies (just expression)
    ($body:expr) => {
        $crate::computed(move || $body)
    };
}

/// Create an effect with automatic variable capturing.
///
/// Wraps `effect(cloned!(... => move || ...))`.
///
/// # Usage
///
/// ```rust
/// use cinder::{effect, signal};
/// let log = signal(0);
///
/// effect!(log => {
///     println!("Log changed: {:?}", log.get());
/// });
/// ```
#[macro_export]
macro_rules! effect {
    // Case 1: With dependencies
    ($($deps:ident),+ => $body:expr) => {
        $crate::effect($crate::cloned!($($deps),+ => move || $body))
    };
    // Case 2: No dependencies
    ($body:expr) => {
        $crate::effect(move || $body)
    };
}

/// Wrap an expression (with captured dependencies) as a reactive getter slot.
///
/// The body is re-evaluated inside the slot's effect, so any signal it reads
/// becomes a live dependency of that one slot.
///
/// # Usage
///
/// ```rust
/// use cinder::{getter, signal, html};
///
/// let count = signal(0);
/// let tpl = html!("<span>" {getter!(count => count.get())} "</span>");
/// ```
#[macro_export]
macro_rules! getter {
    ($($deps:ident),+ => $body:expr) => {
        $crate::cloned!($($deps),+ =>
            $crate::Value::getter(move || $crate::Value::from($body)))
    };
    ($body:expr) => {
        $crate::Value::getter(move || $crate::Value::from($body))
    };
}

/// Build a [`Template`](crate::Template) from alternating string pieces and
/// `{value}` interpolations.
///
/// The string pieces are materialised as one `static` array per call site,
/// so the compiled template is cached by that array's identity: the same
/// call site never re-parses.
///
/// # Usage
///
/// ```rust
/// use cinder::{html, signal, getter};
///
/// let name = signal("world".to_string());
/// let tpl = html!("<p>hello, " {getter!(name => name.get())} "</p>");
/// ```
///
/// Interpolations may appear anywhere a static piece could end, including
/// back to back and at the very start or end of the template.
#[macro_export]
macro_rules! html {
    ($($tt:tt)*) => {
        $crate::html_pieces!(@stat [] [] $($tt)*)
    };
}

/// Internal muncher for [`html!`]. Two states keep statics and values
/// strictly alternating, inserting empty pieces where the source omits them.
#[doc(hidden)]
#[macro_export]
macro_rules! html_pieces {
    // Expecting a static piece: found one
    (@stat [$($s:tt)*] [$($v:tt)*] $lit:literal $($rest:tt)*) => {
        $crate::html_pieces!(@val [$($s)* $lit,] [$($v)*] $($rest)*)
    };
    // Expecting a static piece: found a value, so the piece is empty
    (@stat [$($s:tt)*] [$($v:tt)*] { $val:expr } $($rest:tt)*) => {
        $crate::html_pieces!(@stat
            [$($s)* "",]
            [$($v)* $crate::Value::from($val),]
            $($rest)*)
    };
    // Expecting a static piece: end of input closes with an empty piece
    (@stat [$($s:tt)*] [$($v:tt)*]) => {
        $crate::html_pieces!(@emit [$($s)* "",] [$($v)*])
    };

    // A piece was just pushed: a value keeps the alternation
    (@val [$($s:tt)*] [$($v:tt)*] { $val:expr } $($rest:tt)*) => {
        $crate::html_pieces!(@stat
            [$($s)*]
            [$($v)* $crate::Value::from($val),]
            $($rest)*)
    };
    // A piece was just pushed and input ends: counts already line up
    (@val [$($s:tt)*] [$($v:tt)*]) => {
        $crate::html_pieces!(@emit [$($s)*] [$($v)*])
    };

    // The accumulators stay `tt`s all the way down: re-matching captured
    // `expr` fragments against an `expr` matcher is rejected since the 2024
    // edition, so they are emitted verbatim.
    (@emit [$($s:tt)*] [$($v:tt)*]) => {{
        static PIECES: &[&str] = &[$($s)*];
        $crate::template::compile::html(PIECES, vec![$($v)*])
    }};
}

// =============================================================================
// TESTS
// =============================================================================
