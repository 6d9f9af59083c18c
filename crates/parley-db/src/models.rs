/// Database row type for users — maps directly to a SQLite row. Message and
/// presence rows convert straight into the parley-types models, so only the
/// auth record needs its own shape here.
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub created_at: String,
}
