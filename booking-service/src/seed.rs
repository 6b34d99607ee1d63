use anyhow::Result;
use bigdecimal::BigDecimal;
use chrono::Utc;
use diesel_async::RunQueryDsl;
use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;
use rand::Rng;
use shared::db::DbPool;
use shared::models::{Listing, User};
use shared::schema::{listings, users};
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

const TITLES: [&str; 6] = [
    "Cozy Cabin in the Mountains",
    "Downtown Apartment",
    "Beachside Bungalow",
    "Luxury Villa",
    "Rustic Farmhouse",
    "Modern Studio",
];

const LOCATIONS: [&str; 6] = ["New York", "Los Angeles", "San Francisco", "Miami", "Denver", "Austin"];

pub const DEMO_USERNAME: &str = "demo";

fn demo_user() -> User {
    User {
        id: Uuid::new_v4(),
        username: DEMO_USERNAME.to_string(),
        email: "demo@example.com".to_string(),
        first_name: "Demo".to_string(),
        last_name: "Traveler".to_string(),
        created_at: Utc::now(),
    }
}

fn random_listings(rng: &mut impl Rng, count: usize) -> Result<Vec<Listing>> {
    (0..count)
        .map(|_| -> Result<Listing> {
            let code: String = (0..5).map(|_| char::from(rng.sample(Alphanumeric))).collect();
            let price = format!("{:.2}", rng.gen_range(50.0..500.0));
            Ok(Listing {
                id: Uuid::new_v4(),
                title: TITLES.choose(rng).unwrap_or(&TITLES[0]).to_string(),
                description: format!("This is a nice place to stay. Code: {}", code),
                price_per_night: BigDecimal::from_str(&price)?,
                location: LOCATIONS.choose(rng).unwrap_or(&LOCATIONS[0]).to_string(),
                created_at: Utc::now(),
            })
        })
        .collect()
}

pub async fn run(pool: &DbPool, count: usize) -> Result<()> {
    let listings = random_listings(&mut rand::thread_rng(), count)?;
    let mut conn = pool.get().await?;

    let inserted_users = diesel::insert_into(users::table)
        .values(&demo_user())
        .on_conflict(users::username)
        .do_nothing()
        .execute(&mut conn)
        .await?;
    if inserted_users > 0 {
        info!(username = DEMO_USERNAME, "Demo user created");
    }

    let inserted = diesel::insert_into(listings::table)
        .values(&listings)
        .execute(&mut conn)
        .await?;

    info!(count = inserted, "Successfully seeded listings");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::ToPrimitive;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn seeded_listings_use_known_titles_and_sane_prices() {
        let mut rng = StdRng::seed_from_u64(7);
        let listings = random_listings(&mut rng, 20).unwrap();
        assert_eq!(listings.len(), 20);

        for listing in &listings {
            assert!(TITLES.contains(&listing.title.as_str()));
            assert!(LOCATIONS.contains(&listing.location.as_str()));
            assert!(listing.description.starts_with("This is a nice place to stay. Code: "));

            let price = listing.price_per_night.to_f64().unwrap();
            assert!((50.0..=500.0).contains(&price), "{price}");
            assert!(listing.price_per_night.as_bigint_and_exponent().1 <= 2);
        }
    }
}
