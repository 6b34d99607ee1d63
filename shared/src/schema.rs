diesel::table! {
    users (id) {
        id -> Uuid,
        username -> Varchar,
        email -> Varchar,
        first_name -> Varchar,
        last_name -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    listings (id) {
        id -> Uuid,
        title -> Varchar,
        description -> Text,
        price_per_night -> Numeric,
        location -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    bookings (id) {
        id -> Uuid,
        listing_id -> Uuid,
        user_id -> Uuid,
        start_date -> Date,
        end_date -> Date,
        status -> Varchar,
        booked_at -> Timestamptz,
    }
}

diesel::table! {
    reviews (id) {
        id -> Uuid,
        listing_id -> Uuid,
        user_id -> Uuid,
        rating -> Int4,
        comment -> Text,
        reviewed_at -> Timestamptz,
    }
}

diesel::table! {
    payments (id) {
        id -> Uuid,
        booking_id -> Uuid,
        reference -> Varchar,
        amount -> Numeric,
        currency -> Varchar,
        status -> Varchar,
        payment_method -> Nullable<Varchar>,
        transaction_id -> Nullable<Varchar>,
        chapa_transaction_ref -> Nullable<Varchar>,
        checkout_url -> Nullable<Varchar>,
        customer_email -> Nullable<Varchar>,
        customer_name -> Nullable<Varchar>,
        customer_phone -> Nullable<Varchar>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    processed_tasks (task_id) {
        task_id -> Uuid,
        task_name -> Varchar,
        processed_at -> Timestamptz,
    }
}

diesel::joinable!(bookings -> listings (listing_id));
diesel::joinable!(bookings -> users (user_id));
diesel::joinable!(reviews -> listings (listing_id));
diesel::joinable!(reviews -> users (user_id));
diesel::joinable!(payments -> bookings (booking_id));

diesel::allow_tables_to_appear_in_same_query!(
    users,
    listings,
    bookings,
    reviews,
    payments,
    processed_tasks,
);
