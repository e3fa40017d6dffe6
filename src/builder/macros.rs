//! Macros for declaring state sets.

/// Build a [`StateSet`](crate::core::StateSet) from bare identifiers.
///
/// States get flag bits in declaration order. Aliases are registered after
/// the states, in order, so an alias may name an earlier alias. The
/// expansion evaluates to `StateResult<StateSet>`.
///
/// # Example
///
/// ```
/// use stateshelf::state_set;
///
/// let states = state_set! {
///     default: pending;
///     states: [foo, bar, baz];
///     aliases: { xyzzy = [foo, bar] };
///     check_alias: false;
/// }
/// .unwrap();
///
/// assert_eq!(states.default_name(), "PENDING");
/// assert_eq!(states.from_name("xyzzy").unwrap().value(), 3);
/// assert!(!states.checks_alias());
/// ```
#[macro_export]
macro_rules! state_set {
    (
        $(default: $default:ident;)?
        states: [$($state:ident),* $(,)?];
        $(aliases: { $($alias:ident = [$($part:ident),+ $(,)?]),* $(,)? };)?
        $(check_alias: $check:expr;)?
    ) => {
        (|| -> $crate::core::StateResult<$crate::core::StateSet> {
            #[allow(unused_mut)]
            let mut set = $crate::core::StateSet::new();
            $( set = $crate::core::StateSet::with_default_state(stringify!($default))?; )?
            $( set = set.check_alias($check); )?
            $( set.add(stringify!($state))?; )*
            $($( set.alias(stringify!($alias), [$(stringify!($part)),+])?; )*)?
            Ok(set)
        })()
    };
}

#[cfg(test)]
mod tests {
    use crate::core::{Flags, StateError};

    #[test]
    fn state_set_macro_assigns_bits_in_order() {
        let states = state_set! {
            states: [foo, bar, baz];
        }
        .unwrap();

        assert_eq!(states.default_name(), "NEW");
        assert_eq!(states.from_name("foo").unwrap(), Flags::new(1));
        assert_eq!(states.from_name("bar").unwrap(), Flags::new(2));
        assert_eq!(states.from_name("baz").unwrap(), Flags::new(4));
        assert!(states.checks_alias());
    }

    #[test]
    fn state_set_macro_registers_aliases() {
        let states = state_set! {
            states: [foo, bar, baz];
            aliases: {
                xyzzy = [foo, bar],
                all = [xyzzy, baz],
            };
        }
        .unwrap();

        assert_eq!(states.resolve(Flags::new(3)).unwrap(), "XYZZY");
        assert_eq!(states.resolve(Flags::new(7)).unwrap(), "ALL");
    }

    #[test]
    fn state_set_macro_reports_errors() {
        let result = state_set! {
            states: [foo, foo];
        };
        assert!(matches!(result, Err(StateError::StateExists(_))));

        let result = state_set! {
            states: [foo];
            aliases: { xyzzy = [foo, missing] };
        };
        assert!(matches!(result, Err(StateError::InvalidAlias { .. })));
    }

    #[test]
    fn state_set_macro_accepts_empty_vocabulary() {
        let states = state_set!(states: [];).unwrap();
        assert_eq!(states.count(), 0);
    }
}
