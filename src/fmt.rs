//! Logging shims: forward to `defmt` when the feature is on, vanish otherwise
//! so host tests link without a global logger.
#![allow(unused_macros)]

macro_rules! debug {
    ($($arg:expr),* $(,)?) => {{
        #[cfg(feature = "defmt")]
        ::defmt::debug!($($arg),*);
        #[cfg(not(feature = "defmt"))]
        let _ = ($(&$arg),*);
    }};
}

macro_rules! info {
    ($($arg:expr),* $(,)?) => {{
        #[cfg(feature = "defmt")]
        ::defmt::info!($($arg),*);
        #[cfg(not(feature = "defmt"))]
        let _ = ($(&$arg),*);
    }};
}

macro_rules! warn {
    ($($arg:expr),* $(,)?) => {{
        #[cfg(feature = "defmt")]
        ::defmt::warn!($($arg),*);
        #[cfg(not(feature = "defmt"))]
        let _ = ($(&$arg),*);
    }};
}

macro_rules! error {
    ($($arg:expr),* $(,)?) => {{
        #[cfg(feature = "defmt")]
        ::defmt::error!($($arg),*);
        #[cfg(not(feature = "defmt"))]
        let _ = ($(&$arg),*);
    }};
}
