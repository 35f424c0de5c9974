//! Status helper enums mapping to SMALLSERIAL/SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding lookup table (`job_states`, `task_states`, ...).

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
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
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Every variant, in id order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// The seeded lookup-table name of this variant.
            pub fn name(self) -> &'static str {
                match self {
                    $( $name::$variant => stringify!($variant) ),+
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }

        impl TryFrom<StatusId> for $name {
            type Error = CoreError;

            fn try_from(id: StatusId) -> Result<Self, Self::Error> {
                match id {
                    $( x if x == $val => Ok($name::$variant), )+
                    _ => Err(CoreError::InvalidStatus { kind: stringify!($name), id }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

define_status_enum! {
    /// Job lifecycle state. `Cancelled` and `Archived` are operator overrides;
    /// the rest are derived from task counts.
    JobState {
        InProgress = 1,
        Cancelled = 2,
        Success = 3,
        Archived = 4,
        Failure = 5,
    }
}

define_status_enum! {
    /// Task lifecycle state.
    TaskState {
        Waiting = 1,
        Running = 2,
        Success = 3,
        Failure = 4,
        Skipped = 5,
        Queued = 6,
        Depend = 7,
    }
}

define_status_enum! {
    /// Analyst liveness.
    AnalystState {
        Up = 1,
        Down = 2,
    }
}

define_status_enum! {
    /// Analyst dispatch lock. A locked analyst receives no new work.
    LockState {
        Unlocked = 1,
        Locked = 2,
    }
}

define_status_enum! {
    /// Kind of dependency edge.
    DependType {
        JobOnJob = 1,
        TaskOnTask = 2,
    }
}

define_status_enum! {
    /// Dependency edge state. Only `Active` edges gate dispatch.
    DependState {
        Active = 1,
        Inactive = 2,
    }
}

impl JobState {
    /// Finished job states release JobOnJob dependency edges.
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            JobState::Success | JobState::Failure | JobState::Cancelled | JobState::Archived
        )
    }
}

impl TaskState {
    /// Terminal task states. `Failure` can still be retried by an operator.
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            TaskState::Success | TaskState::Failure | TaskState::Skipped
        )
    }

    /// Task has been handed to an analyst and not yet reported back.
    pub fn is_dispatched(self) -> bool {
        matches!(self, TaskState::Queued | TaskState::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_match_seed_order() {
        assert_eq!(JobState::InProgress.id(), 1);
        assert_eq!(JobState::Failure.id(), 5);
        assert_eq!(TaskState::Waiting.id(), 1);
        assert_eq!(TaskState::Queued.id(), 6);
        assert_eq!(TaskState::Depend.id(), 7);
        assert_eq!(LockState::Locked.id(), 2);
    }

    #[test]
    fn try_from_round_trips_every_variant() {
        for state in TaskState::ALL {
            assert_eq!(TaskState::try_from(state.id()).unwrap(), *state);
        }
        for state in JobState::ALL {
            assert_eq!(JobState::try_from(state.id()).unwrap(), *state);
        }
    }

    #[test]
    fn try_from_unknown_id_is_typed_error() {
        let err = TaskState::try_from(42).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidStatus { kind: "TaskState", id: 42 }
        ));
    }

    #[test]
    fn serializes_as_variant_name() {
        let json = serde_json::to_string(&TaskState::Skipped).unwrap();
        assert_eq!(json, "\"Skipped\"");
        let parsed: TaskState = serde_json::from_str("\"Waiting\"").unwrap();
        assert_eq!(parsed, TaskState::Waiting);
    }

    #[test]
    fn finished_states() {
        assert!(TaskState::Failure.is_finished());
        assert!(!TaskState::Depend.is_finished());
        assert!(JobState::Cancelled.is_finished());
        assert!(!JobState::InProgress.is_finished());
    }
}
