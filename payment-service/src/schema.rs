diesel::table! {
    payments (id) {
        id -> Int4,
        uuid -> Uuid,
        order_id -> Uuid,
        amount -> Numeric,
        status -> Int4,
        payment_link -> Varchar,
        invoice_link -> Nullable<Varchar>,
        va_number -> Nullable<Varchar>,
        bank -> Nullable<Varchar>,
        acquirer -> Nullable<Varchar>,
        transaction_id -> Nullable<Varchar>,
        description -> Nullable<Text>,
        paid_at -> Nullable<Timestamptz>,
        expired_at -> Timestamptz,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    payment_histories (id) {
        id -> Int4,
        payment_id -> Int4,
        status -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(payment_histories -> payments (payment_id));

diesel::allow_tables_to_appear_in_same_query!(
    payments,
    payment_histories,
);
