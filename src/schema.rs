//! Diesel table definitions.

diesel::table! {
    documents (id) {
        id -> Integer,
        file_name -> Text,
        summary -> Text,
        uploaded_at -> Timestamp,
        file_path -> Text,
    }
}

diesel::table! {
    daily_accesses (document_id, date) {
        document_id -> Integer,
        date -> Date,
        access_count -> Integer,
    }
}

diesel::allow_tables_to_appear_in_same_query!(documents, daily_accesses);
