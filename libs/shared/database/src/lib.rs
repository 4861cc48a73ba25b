pub mod live;
pub mod supabase;

pub use supabase::{StoreError, SupabaseClient};
