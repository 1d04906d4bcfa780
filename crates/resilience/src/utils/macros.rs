//! Declarative helpers shared by the resilience types

/// Implements `Display` and `FromStr` for a fieldless state enum
///
/// Each variant is mapped to one lowercase name. `Display` writes that name;
/// `FromStr` accepts it case-insensitively and rejects anything else with a
/// message naming the enum.
///
/// ```rust
/// use resilience_core::impl_state_names;
///
/// #[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// pub enum Gate {
///     Shut,
///     Ajar,
/// }
///
/// impl_state_names!(Gate {
///     Shut => "shut",
///     Ajar => "ajar",
/// });
///
/// assert_eq!(Gate::Ajar.to_string(), "ajar");
/// assert_eq!("SHUT".parse::<Gate>(), Ok(Gate::Shut));
/// ```
#[macro_export]
macro_rules! impl_state_names {
    ($enum_name:ident { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => f.write_str($name),)+
                }
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($name => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Phase {
        Idle,
        Probing,
        CoolingDown,
    }

    impl_state_names!(Phase {
        Idle => "idle",
        Probing => "probing",
        CoolingDown => "cooling-down",
    });

    #[test]
    fn test_display_uses_mapped_names() {
        assert_eq!(Phase::Idle.to_string(), "idle");
        assert_eq!(Phase::Probing.to_string(), "probing");
        assert_eq!(Phase::CoolingDown.to_string(), "cooling-down");
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(Phase::from_str("IDLE").unwrap(), Phase::Idle);
        assert_eq!(Phase::from_str("Cooling-Down").unwrap(), Phase::CoolingDown);
    }

    #[test]
    fn test_parse_rejects_unknown_names() {
        let err = Phase::from_str("cooling_down").unwrap_err();
        assert!(err.contains("Invalid Phase: cooling_down"));
        assert!(Phase::from_str("").is_err());
    }

    #[test]
    fn test_roundtrip() {
        for phase in [Phase::Idle, Phase::Probing, Phase::CoolingDown] {
            assert_eq!(phase.to_string().parse::<Phase>().unwrap(), phase);
        }
    }
}
