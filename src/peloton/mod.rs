pub mod instructor;
pub mod ride;
pub mod user;
pub mod workout;

pub use instructor::{InstructorRow, PelotonInstructor};
pub use ride::{PelotonRide, RideRow, RideType, RideTypeLookup, fetch_ride_types};
pub use user::{PelotonUser, UserRow};
pub use workout::{PelotonWorkout, PerformanceGraphRow, WorkoutRow, WorkoutSummary};
