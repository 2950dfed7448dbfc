use clap::Parser;
use geo::Point;
use osrm_isochrones::{
    compute_isochrones, Crs, IsochroneOptions, Origin, OsrmClient, OsrmConfig, SphericalMercator,
    DEFAULT_BREAKS, DEFAULT_RESOLUTION, DEFAULT_SPEED_KMH,
};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Isochrone bands around an origin from an OSRM routing server.
///
/// OSRM settings default to OSRM_SERVER, OSRM_PROFILE, OSRM_EXCLUDE,
/// OSRM_MAX_TABLE_DESTINATIONS and OSRM_TIMEOUT_SECS.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Origin longitude, or x in --crs
    #[arg(long, allow_negative_numbers = true)]
    lon: f64,
    /// Origin latitude, or y in --crs
    #[arg(long, allow_negative_numbers = true)]
    lat: f64,
    /// CRS of the origin, e.g. EPSG:3857 [default: EPSG:4326]
    #[arg(long)]
    crs: Option<Crs>,
    /// Comma-separated travel times in minutes
    #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_BREAKS.to_vec())]
    breaks: Vec<f64>,
    /// Grid points along each axis
    #[arg(long, default_value_t = DEFAULT_RESOLUTION)]
    resolution: usize,
    /// Assumed average speed in km/h, bounds the sampled area
    #[arg(long, default_value_t = DEFAULT_SPEED_KMH)]
    speed: f64,
    #[arg(long)]
    server: Option<String>,
    #[arg(long)]
    profile: Option<String>,
    /// Road classes to avoid, e.g. motorway
    #[arg(long)]
    exclude: Option<String>,
    /// CRS of the written geometry [default: the origin's CRS]
    #[arg(long)]
    output_crs: Option<Crs>,
    /// Keep contour vertices on cell edges
    #[arg(long)]
    no_smooth: bool,
    /// GeoJSON file to write [default: isochrone_<hash>.geojson]
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("osrm_isochrones=info")),
        )
        .init();

    let args = Args::parse();

    let mut config = OsrmConfig::from_env();
    if let Some(server) = args.server.clone() {
        config.server_base_url = server;
    }
    if let Some(profile) = args.profile.clone() {
        config.profile = profile;
    }
    if args.exclude.is_some() {
        config.exclude = args.exclude.clone();
    }

    let str_to_hash = format!(
        "{}{}{:?}{:?}{}{}{}{}",
        args.lon,
        args.lat,
        args.crs,
        args.breaks,
        args.resolution,
        args.speed,
        config.server_base_url,
        config.profile
    );
    let output = args.output.clone().unwrap_or_else(|| {
        PathBuf::from(format!("isochrone_{}.geojson", calculate_hash(&str_to_hash)))
    });

    let point = Point::new(args.lon, args.lat);
    let origin = match args.crs {
        Some(crs) => Origin::with_crs(point, crs),
        None => Origin::new(args.lon, args.lat),
    };
    let options = IsochroneOptions {
        breaks: args.breaks,
        resolution: args.resolution,
        speed_kmh: args.speed,
        smooth: !args.no_smooth,
        output_crs: args.output_crs,
    };

    let client = OsrmClient::new(config)?;

    let start_time = std::time::Instant::now();
    let isochrones = compute_isochrones(&origin, &options, &client, &SphericalMercator)?;
    info!(
        bands = isochrones.bands.len(),
        elapsed_ms = start_time.elapsed().as_millis() as u64,
        "created isochrones"
    );

    std::fs::write(&output, isochrones.to_geojson().to_string())?;
    info!(path = %output.display(), "saved isochrones");

    Ok(())
}

fn calculate_hash<T: Hash>(t: &T) -> u64 {
    let mut s = DefaultHasher::new();
    t.hash(&mut s);
    s.finish()
}
