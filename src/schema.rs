// Kept in sync with the DDL in `repository::diesel_pool::init_schema`.

diesel::table! {
    documents (id) {
        id -> Text,
        dedup_key -> Text,
        title -> Nullable<Text>,
        filename -> Text,
        file_extension -> Nullable<Text>,
        mime_type -> Nullable<Text>,
        upload_date -> Text,
        uploaded_by -> Text,
        status -> Text,
        metadata -> Text,
        tags -> Text,
        read_group_refs -> Text,
        write_group_refs -> Text,
        location_path -> Text,
        storage_type -> Text,
        bucket_name -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    notifications (id) {
        id -> Text,
        user_id -> Text,
        title -> Text,
        message -> Text,
        kind -> Text,
        category -> Text,
        data -> Text,
        priority -> Text,
        read_at -> Nullable<Text>,
        expires_at -> Text,
        created_at -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(documents, notifications);
