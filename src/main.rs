#[rocket::main]
async fn main() -> Result<(), rocket::Error> {
    placement_api::rocket().launch().await?;
    Ok(())
}
