/// Generate a new entity id.
///
/// Ids are UUID v7 in simple (hyphen-free) form, so they sort by creation
/// time and never contain the characters reserved by the key encoding.
pub fn generate_id() -> String {
    uuid::Uuid::now_v7().simple().to_string()
}
