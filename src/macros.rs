#[macro_export]
macro_rules! dummy {
    ($t:expr) => {
        ()
    };
}

/// Defines a closed set of hardware slots, each mapped to a fixed entry in a
/// lookup table.
#[macro_export]
macro_rules! slot_def {
    (
        $(#[doc = $doc:expr])*
        $vis:vis $name:ident => $entry:ty {
            $(
                $(#[doc = $slot_doc:expr])*
                $slot:ident => $value:expr
            ),*
        }
    ) => {
        $(#[doc = $doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        #[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
        pub enum $name {
            $(
                $(#[doc = $slot_doc])*
                $slot,
            )*
        }

        impl $name {
            #[doc = concat!("All [`", stringify!($name), "`] slots, in priority order.")]
            pub const ALL: [Self; <[_]>::len(&[$($crate::dummy!($slot)),*])] = [$(Self::$slot),*];

            const TABLE: [$entry; <[_]>::len(&[$($crate::dummy!($slot)),*])] = [$($value),*];

            /// Fixed hardware addressing of this slot.
            #[inline]
            $vis const fn entry(self) -> $entry {
                Self::TABLE[self as usize]
            }
        }
    };
}
