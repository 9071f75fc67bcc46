/// Default question asked about each uploaded produce photo. The answer format
/// carries the `Best county for selling` line the extractor looks for.
pub const PRODUCE_ANALYSIS_QUESTION: &str = "\
Identify the vegetable/fruit and analyze its current shelf life, ripening period, and ideal market timing post-ripening. \
Detail the prime harvest season and offer both the present and expected market rates in KES within the Kenyan market after sale. \
Further, determine the optimal Kenyan county for selling this produce, providing both the county's name and its geographical coordinates for map plotting purposes.

The output should be presented in the following format separately for each detected fruit/vegetable:

## {Fruit/Vegetable Name}

● **Current maturity stage:** {stage}
● **Remaining shelf life:** {time}
● **Optimal harvest window:** {window}
● **Best post-harvest handling practices:** {practices}
● **Ideal storage conditions:** {conditions}
● **Present market rate (KES):** {current_rate}
● **Expected market rate (KES):** {expected_rate}
● **Best county for selling:** {best_county}
● **Coordinates:** {latitude},{longitude}
● **Value-added processing options:** {options}
● **Immediate vs. delayed selling strategy:** {strategy}
● **Quality grading criteria:** {criteria}
● **Common post-harvest diseases:** {diseases}
● **Transportation recommendations:** {recommendations}
● **Local vs. export market potential:** {potential}
● **Certifications or standards:** {certifications}
● **Nutritional peak:** {peak}
● **Ethylene sensitivity/production:** {ethylene}
● **Sustainable packaging options:** {packaging}";
