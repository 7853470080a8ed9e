//! Status helper enums mapping to SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data in the
//! corresponding `*_statuses` table.

use adgen_core::campaign::CampaignStatus as DomainStatus;

/// Status ID type matching SMALLINT in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Look up a variant by its database status ID.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( v if v == $val => Some(Self::$variant), )+
                    _ => None,
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }
    };
}

define_status_enum! {
    /// Campaign lifecycle status (`campaign_statuses`).
    CampaignStatusId {
        Generating = 1,
        Completed = 2,
        Failed = 3,
    }
}

impl From<DomainStatus> for CampaignStatusId {
    fn from(status: DomainStatus) -> Self {
        match status {
            DomainStatus::Generating => Self::Generating,
            DomainStatus::Completed => Self::Completed,
            DomainStatus::Failed => Self::Failed,
        }
    }
}

impl From<CampaignStatusId> for DomainStatus {
    fn from(status: CampaignStatusId) -> Self {
        match status {
            CampaignStatusId::Generating => Self::Generating,
            CampaignStatusId::Completed => Self::Completed,
            CampaignStatusId::Failed => Self::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_match_seed_data() {
        assert_eq!(CampaignStatusId::Generating.id(), 1);
        assert_eq!(CampaignStatusId::Completed.id(), 2);
        assert_eq!(CampaignStatusId::Failed.id(), 3);
    }

    #[test]
    fn from_id_rejects_unknown() {
        assert_eq!(CampaignStatusId::from_id(2), Some(CampaignStatusId::Completed));
        assert_eq!(CampaignStatusId::from_id(0), None);
        assert_eq!(CampaignStatusId::from_id(4), None);
    }

    #[test]
    fn domain_mapping_round_trips() {
        for status in [
            DomainStatus::Generating,
            DomainStatus::Completed,
            DomainStatus::Failed,
        ] {
            let id = CampaignStatusId::from(status);
            assert_eq!(DomainStatus::from(id), status);
        }
    }
}
