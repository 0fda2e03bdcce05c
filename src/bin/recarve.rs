use clap::{App, Arg};

use recarve::{
    edge_image, grayscale_image, horizontal_energy_image, image_from_rgba, image_to_rgba, resize,
    vertical_energy_image, CarveOptions, EnergyMode, Kernel, Matrix,
};

fn main() {
    let matches = App::new("recarve")
        .version("0.1.0")
        .about("Content-aware image resizing")
        .arg(
            Arg::with_name("INPUT")
                .help("The image to retarget")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("OUTPUT")
                .help("Where to write the result")
                .required(true)
                .index(2),
        )
        .arg(
            Arg::with_name("width")
                .short("w")
                .long("width")
                .takes_value(true)
                .help("Goal width in pixels (default: unchanged)"),
        )
        .arg(
            Arg::with_name("height")
                .short("H")
                .long("height")
                .takes_value(true)
                .help("Goal height in pixels (default: unchanged)"),
        )
        .arg(
            Arg::with_name("kernel")
                .short("k")
                .long("kernel")
                .takes_value(true)
                .possible_values(&["prewitt", "vsquare", "v1", "sobel", "laplacian"])
                .default_value("prewitt")
                .help("Edge detection kernel"),
        )
        .arg(
            Arg::with_name("energy")
                .short("e")
                .long("energy")
                .takes_value(true)
                .possible_values(&["backward", "forward"])
                .default_value("backward")
                .help("Seam cost model"),
        )
        .arg(
            Arg::with_name("add-weight")
                .long("add-weight")
                .takes_value(true)
                .help("Bias against reinserting on top of a previous seam"),
        )
        .arg(
            Arg::with_name("threads")
                .short("t")
                .long("threads")
                .takes_value(true)
                .help("Worker threads per crew (minimum 2)"),
        )
        .arg(
            Arg::with_name("show")
                .long("show")
                .takes_value(true)
                .possible_values(&["gray", "edge", "energy", "energy-horizontal"])
                .help("Write an intermediate view instead of resizing"),
        )
        .get_matches();

    let input = matches.value_of("INPUT").unwrap();
    let output = matches.value_of("OUTPUT").unwrap();
    let decoded = image::open(input).expect("could not open the input image");
    let image = image_from_rgba(&decoded.to_rgba());

    let mut opts = CarveOptions::default();
    opts.kernel = match matches.value_of("kernel").unwrap() {
        "vsquare" => Kernel::VSquare,
        "v1" => Kernel::V1,
        "sobel" => Kernel::Sobel,
        "laplacian" => Kernel::Laplacian,
        _ => Kernel::Prewitt,
    };
    opts.energy = match matches.value_of("energy").unwrap() {
        "forward" => EnergyMode::Forward,
        _ => EnergyMode::Backward,
    };
    if let Some(weight) = matches.value_of("add-weight") {
        opts.add_weight = weight.parse().expect("add-weight must be an integer");
    }
    if let Some(threads) = matches.value_of("threads") {
        opts.set_threads(threads.parse().expect("threads must be a number"));
    }

    let result = match matches.value_of("show") {
        Some("gray") => grayscale_image(&image, &opts),
        Some("edge") => edge_image(&image, &opts),
        Some("energy") => vertical_energy_image(&image, &opts),
        Some("energy-horizontal") => horizontal_energy_image(&image, &opts),
        _ => {
            let goal_x = matches
                .value_of("width")
                .map(|v| v.parse().expect("width must be a number"))
                .unwrap_or_else(|| image.width());
            let goal_y = matches
                .value_of("height")
                .map(|v| v.parse().expect("height must be a number"))
                .unwrap_or_else(|| image.height());
            let weights = Matrix::new(image.width(), image.height());
            let mut report = |fraction: f32| {
                eprint!("\r{:3.0}%", fraction * 100.0);
                true
            };
            let carved = resize(&image, &weights, goal_x, goal_y, &opts, Some(&mut report));
            eprintln!("\r100%");
            carved.map(|(image, _)| image)
        }
    };

    let result = result.expect("resize failed");
    image_to_rgba(&result)
        .save(output)
        .expect("could not write the output image");
}
