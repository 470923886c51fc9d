// Mirrors schema.sql.

diesel::table! {
    file_snapshot (id) {
        id -> Int8,
        node_name -> Text,
        mount_path -> Text,
        file_list -> Array<Text>,
        records -> Jsonb,
        created_at -> Timestamptz,
    }
}
