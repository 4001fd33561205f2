use anyhow::Result;
use clap::Parser;
use dotenvy::dotenv;
use ops::{
    AddOne, CharToString, GenericMultiplication, IsAlphabetic, IsEven, Max, StringConcat,
    StringLength, Sum, WeightByIndex,
};
use scatterfold::{config::DriverConfig, driver::Driver};
use tracing::info;

mod init;

#[derive(Parser, Debug)]
pub struct Cli {
    #[command(flatten)]
    pub options: DriverConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init::tracing();

    let args = Cli::parse();
    let driver = Driver::new(args.options)?;

    let input: Vec<char> = "hello, world!".chars().collect();
    let letters = driver.filter(&IsAlphabetic, input).await?;
    let strings = driver.map(&CharToString, letters).await?;
    let result = driver.reduce(&StringConcat, strings).await?;
    info!("{result:?}");

    let words = vec!["scatter".to_string(), "fold".to_string(), String::new()];
    let lengths = driver.map(&StringLength, words).await?;
    info!("{lengths:?}");

    let numbers: Vec<i64> = (1..=20).collect();
    let incremented = driver.map(&AddOne, numbers.clone()).await?;
    let evens = driver.filter(&IsEven, incremented).await?;
    let total = driver.reduce(&Sum, evens).await?;
    info!("{total:?}");

    let weighted = driver.map(&WeightByIndex, numbers).await?;
    info!("{weighted:?}");

    let batches = vec![vec![3, 1], vec![], vec![7, 2, 9], vec![4]];
    let maxima = driver.map(&Max, batches).await?;
    let max = driver.reduce(&Max, maxima).await?;
    info!("{max:?}");

    let product = driver
        .reduce(&GenericMultiplication::<i32>::default(), vec![1, 2, 3, 4, 5, 6])
        .await?;
    info!("{product:?}");

    Ok(())
}
