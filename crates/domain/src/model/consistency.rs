use strum_macros::{Display, EnumString, IntoStaticStr};

/// Replica acknowledgement level requested for a statement.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, IntoStaticStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum Consistency {
    Any,
    #[default]
    One,
    Two,
    Three,
    Quorum,
    All,
    LocalQuorum,
    EachQuorum,
    Serial,
    LocalSerial,
    LocalOne,
}

impl Consistency {
    /// Number of live replicas that must acknowledge a request for the given
    /// replication factor. `ANY` is satisfied by the coordinator alone.
    pub fn required_replicas(self, replication_factor: usize) -> usize {
        let quorum = replication_factor / 2 + 1;
        match self {
            Consistency::Any => 0,
            Consistency::One | Consistency::LocalOne => 1,
            Consistency::Two => 2,
            Consistency::Three => 3,
            Consistency::Quorum
            | Consistency::LocalQuorum
            | Consistency::EachQuorum
            | Consistency::Serial
            | Consistency::LocalSerial => quorum,
            Consistency::All => replication_factor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!("local_quorum".parse::<Consistency>().unwrap(), Consistency::LocalQuorum);
        assert_eq!("ONE".parse::<Consistency>().unwrap(), Consistency::One);
        assert!("most".parse::<Consistency>().is_err());
        assert_eq!(Consistency::EachQuorum.to_string(), "EACH_QUORUM");
    }

    #[test]
    fn quorum_is_majority_of_replicas() {
        assert_eq!(Consistency::Quorum.required_replicas(1), 1);
        assert_eq!(Consistency::Quorum.required_replicas(3), 2);
        assert_eq!(Consistency::All.required_replicas(3), 3);
        assert_eq!(Consistency::Any.required_replicas(3), 0);
    }
}
