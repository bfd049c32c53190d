use booking_api_client::{
    ApiClient, ApiError, ClientConfig, Interceptors, OutgoingRequest, QueryParams, RequestOptions,
    Result,
};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct Service {
    id: u64,
    name: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let interceptors = Interceptors::new()
        .on_request(|mut request: OutgoingRequest| -> Result<OutgoingRequest> {
            request
                .headers
                .insert("x-client", "booking-demo".parse().map_err(|_| {
                    ApiError::configuration("invalid x-client header")
                })?);
            Ok(request)
        })
        .on_error(|error: ApiError| {
            eprintln!("request failed: {}", error.to_json());
            error
        });

    let config = ClientConfig::from_env()?.with_interceptors(interceptors);
    let client = ApiClient::new(config);

    let services: Vec<Service> = client
        .get_as("/tenants/demo/services", QueryParams::new().with("active", true))
        .await?;
    for service in &services {
        println!("{} {}", service.id, service.name);
    }

    let slots = client
        .get_with(
            "/tenants/demo/slots",
            [("date", "2024-05-06")],
            RequestOptions::new().cache_ttl_ms(5_000),
        )
        .await?;
    println!("slots: {slots}");

    match client
        .post(
            "/tenants/demo/bookings",
            &json!({"service": services.first().map(|s| s.id), "slot": "09:00"}),
        )
        .await
    {
        Ok(booking) => println!("booked: {booking}"),
        Err(err) => println!("{} ({})", err.user_message(), err.kind()),
    }

    Ok(())
}
