//! Driver error infrastructure.
//!
//! Provides the `define_driver_error!` macro used by every Marlin driver
//! crate. Each error type carries a one-byte subsystem identifier and a
//! per-variant code, so any error formats as a stable `Exxyy` value that can
//! be grepped out of a serial log.
//!
//! ## Usage
//!
//! ### Simple errors (no inner data)
//! ```ignore
//! define_driver_error! {
//!     pub enum PhyError(0x03) {
//!         InvalidState = 0x01 => "Operation not allowed in current state",
//!         SlotsExhausted = 0x02 => "All acquisition slots in use",
//!     }
//! }
//! ```
//!
//! ### Nested errors (wrapping an inner error type)
//!
//! A nested variant also generates a `From<Inner>` impl so `?` propagates
//! across subsystem boundaries. At most one variant per inner type.
//! ```ignore
//! define_driver_error! {
//!     pub enum MapError(0x02) {
//!         Hyp(HalError) = 0x01 => "Privileged call failed",
//!     }
//! }
//! ```

#![no_std]

/// Define a driver error enum with subsystem and variant codes.
///
/// Generates `code()`, `describe()`, `Display`, `core::error::Error`, and a
/// `From` impl for every variant that wraps an inner error.
#[macro_export]
macro_rules! define_driver_error {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident($subsystem:literal) {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident $(($inner:ty))? = $code:literal => $desc:literal
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        $vis enum $name {
            $(
                $(#[$variant_meta])*
                $variant $(($inner))?,
            )*
        }

        impl $name {
            /// Subsystem identifier for this error type.
            pub const SUBSYSTEM: u8 = $subsystem;

            /// Combined subsystem/variant code, `0xSSVV`.
            pub const fn code(&self) -> u16 {
                match self {
                    $(
                        $crate::define_driver_error!(@pattern $variant $(($inner))? _unused) => {
                            (($subsystem as u16) << 8) | $code
                        }
                    )*
                }
            }

            /// Short human-readable description for logging.
            pub const fn describe(&self) -> &'static str {
                match self {
                    $(
                        $crate::define_driver_error!(@pattern $variant $(($inner))? _unused) => {
                            $desc
                        }
                    )*
                }
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                match self {
                    $(
                        $crate::define_driver_error!(@pattern $variant $(($inner))? inner) => {
                            $crate::define_driver_error!(@display_body self f $desc $(($inner))? inner)
                        }
                    )*
                }
            }
        }

        impl core::error::Error for $name {}

        $(
            $crate::define_driver_error!(@from $name $variant $(($inner))?);
        )*
    };

    // Pattern helpers
    (@pattern $variant:ident ($inner:ty) $bind:ident) => { Self::$variant($bind) };
    (@pattern $variant:ident $bind:ident) => { Self::$variant };

    // Display helpers
    (@display_body $self:ident $f:ident $desc:literal ($inner:ty) $bind:ident) => {
        write!($f, "E{:04X}: {} ({})", $self.code(), $desc, $bind)
    };
    (@display_body $self:ident $f:ident $desc:literal $bind:ident) => {
        write!($f, "E{:04X}: {}", $self.code(), $desc)
    };

    // From impls for nested variants
    (@from $name:ident $variant:ident ($inner:ty)) => {
        impl core::convert::From<$inner> for $name {
            fn from(inner: $inner) -> Self {
                Self::$variant(inner)
            }
        }
    };
    (@from $name:ident $variant:ident) => {};
}
