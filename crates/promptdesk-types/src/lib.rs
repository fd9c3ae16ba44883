mod info;
mod profiling;
mod selection;
mod user;

pub use info::*;
pub use profiling::*;
pub use selection::*;
pub use user::*;

pub const AVATAR_PALETTE: [&str; 12] = [
    "bg-blue-500",
    "bg-green-500",
    "bg-purple-500",
    "bg-red-500",
    "bg-yellow-500",
    "bg-indigo-500",
    "bg-pink-500",
    "bg-teal-500",
    "bg-orange-500",
    "bg-cyan-500",
    "bg-lime-500",
    "bg-emerald-500",
];

/// Avatar tag for the `index`-th user, wrapping around the palette.
pub fn avatar_for_index(index: usize) -> &'static str {
    AVATAR_PALETTE[index % AVATAR_PALETTE.len()]
}
