//! Values held by the client cache.

use memwall_api_types::{
    MemoriesPage, Memory, SessionStatus, SharedWall, UserStats, Wall, WallDetail, WallMember,
};
use serde::Serialize;

use crate::cache::FetchError;

/// One cached payload; the variant always matches the key's domain.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Resource {
    Session(SessionStatus),
    UserStats(UserStats),
    MyWalls(Vec<Wall>),
    SharedWalls(Vec<SharedWall>),
    Wall(WallDetail),
    WallMembers(Vec<WallMember>),
    MemoriesPage(MemoriesPage),
    Memory(Memory),
}

impl Resource {
    pub fn kind(&self) -> &'static str {
        match self {
            Resource::Session(_) => "session",
            Resource::UserStats(_) => "user_stats",
            Resource::MyWalls(_) => "my_walls",
            Resource::SharedWalls(_) => "shared_walls",
            Resource::Wall(_) => "wall",
            Resource::WallMembers(_) => "wall_members",
            Resource::MemoriesPage(_) => "memories_page",
            Resource::Memory(_) => "memory",
        }
    }
}

fn mismatch(expected: &str, found: &Resource) -> FetchError {
    FetchError::decode(format!(
        "expected {expected} resource, found {}",
        found.kind()
    ))
}

macro_rules! resource_conversions {
    ($($variant:ident => $ty:ty, $label:literal;)*) => {
        $(
            impl From<$ty> for Resource {
                fn from(value: $ty) -> Self {
                    Resource::$variant(value)
                }
            }

            impl TryFrom<Resource> for $ty {
                type Error = FetchError;

                fn try_from(resource: Resource) -> Result<Self, Self::Error> {
                    match resource {
                        Resource::$variant(value) => Ok(value),
                        other => Err(mismatch($label, &other)),
                    }
                }
            }
        )*
    };
}

resource_conversions! {
    Session => SessionStatus, "session";
    UserStats => UserStats, "user_stats";
    MyWalls => Vec<Wall>, "my_walls";
    SharedWalls => Vec<SharedWall>, "shared_walls";
    Wall => WallDetail, "wall";
    WallMembers => Vec<WallMember>, "wall_members";
    MemoriesPage => MemoriesPage, "memories_page";
    Memory => Memory, "memory";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ErrorKind;

    #[test]
    fn conversion_checks_the_variant() {
        let resource = Resource::from(UserStats::default());
        assert_eq!(resource.kind(), "user_stats");

        let stats = UserStats::try_from(resource.clone()).expect("stats");
        assert_eq!(stats, UserStats::default());

        let err = Vec::<Wall>::try_from(resource).expect_err("wrong variant");
        assert_eq!(err.kind, ErrorKind::Decode);
        assert_eq!(err.message, "expected my_walls resource, found user_stats");
    }
}
